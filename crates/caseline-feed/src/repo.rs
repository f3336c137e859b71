//! Collaborator ports.
//!
//! The production service and the reconciler touch the outside world only
//! through these traits. Implementations are injected by constructor — the
//! orchestration layer owns wiring. `caseline-feed` ships two: the durable
//! [`SqliteSink`](crate::sqlite::SqliteSink) and the in-memory set in
//! [`memory`](crate::memory) used by tests.

use std::time::Duration;

use anyhow::Result;

use caseline_core::case::Case;
use caseline_core::event::task::Task;
use caseline_core::ids::CaseRef;

use crate::record::CaseRecord;
use crate::retry::DeferredProduction;

/// Read access to cases and their status-transition histories.
pub trait CaseRepository {
    /// Load a case with its full history.
    ///
    /// # Errors
    ///
    /// Returns an error if the case does not exist or cannot be loaded.
    fn get(&self, case_ref: &CaseRef) -> Result<Case>;
}

/// Read access to the tasks associated with a case.
pub trait TaskRepository {
    /// All tasks the task system has associated with the case, each with
    /// its ordered event history.
    ///
    /// # Errors
    ///
    /// Returns an error if the task store cannot be read.
    fn tasks_for_case(&self, case_ref: &CaseRef) -> Result<Vec<Task>>;
}

/// Append-only record sink with read-latest-by-key capability.
pub trait RecordSink {
    /// The latest persisted record for a case, by `(change_time,
    /// ingest_time)`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be read.
    fn latest_for_case(&self, case_ref: &CaseRef) -> Result<Option<CaseRecord>>;

    /// The full persisted series for a case, in `(change_time, ingest_time)`
    /// order.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be read.
    fn all_for_case(&self, case_ref: &CaseRef) -> Result<Vec<CaseRecord>>;

    /// Append one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&self, record: &CaseRecord) -> Result<()>;

    /// Append a batch of records atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; no partial batch is visible.
    fn append_many(&self, records: &[CaseRecord]) -> Result<()>;
}

/// Fire-and-forget, at-least-once job rescheduling.
pub trait JobScheduler {
    /// Enqueue a deferred production to run after `delay`.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be enqueued.
    fn reschedule(&self, job: &DeferredProduction, delay: Duration) -> Result<()>;
}
