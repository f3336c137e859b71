//! caseline-core — event model and pure reconciliation fold.
//!
//! Two independent systems emit lifecycle events about the same case: the
//! case-flow system reports status transitions, the task-assignment system
//! reports work-item events. This crate normalizes both streams into one
//! timestamped [`event::Event`] union and folds them, in time order, into
//! point-in-time [`snapshot::Snapshot`]s describing who was working the case
//! and at which organizational unit.
//!
//! Everything in this crate is pure: no I/O, no clock reads, no failure
//! modes. Persistence, record derivation, and retry live in `caseline-feed`.

pub mod case;
pub mod event;
pub mod ids;
pub mod reduce;
pub mod snapshot;

pub use case::{Case, Entitlement, EntitlementKind, HandlingMethod, OutcomeCode};
pub use event::{Event, Source, StatusChanged, Task, TaskEvent, TaskEventKind};
pub use ids::{ActivityCode, CaseRef, OrgUnit, Worker};
pub use reduce::{CaseState, reduce};
pub use snapshot::{Snapshot, snapshots};
