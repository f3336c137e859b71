//! Event union over the two source streams.
//!
//! The reducer does not care which system produced an event beyond the
//! variant itself, so both streams are normalized into one [`Event`] union
//! exposing the case reference, the business timestamp, and the originating
//! [`Source`]. Snapshot computation sorts these by timestamp and folds.

pub mod case;
pub mod task;

pub use case::{CaseStatus, StatusChanged, StepOutcome, WaitReason};
pub use task::{Task, TaskEvent, TaskEventKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::CaseRef;

/// Which system produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    /// The case-flow system (status transitions).
    CaseFlow,
    /// The task-assignment system (work-item lifecycle).
    TaskSystem,
}

/// A lifecycle event from either source, normalized for the fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Event {
    /// A status transition from the case-flow system.
    Case(StatusChanged),
    /// A task lifecycle event, tagged with the case it belongs to.
    Task {
        /// The owning case (tasks without one never become events).
        case_ref: CaseRef,
        /// The task event itself.
        event: TaskEvent,
    },
}

impl Event {
    /// The case this event belongs to.
    #[must_use]
    pub const fn case_ref(&self) -> &CaseRef {
        match self {
            Self::Case(change) => &change.case_ref,
            Self::Task { case_ref, .. } => case_ref,
        }
    }

    /// Business timestamp of the event.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Case(change) => change.timestamp,
            Self::Task { event, .. } => event.timestamp,
        }
    }

    /// Which system produced this event.
    #[must_use]
    pub const fn source(&self) -> Source {
        match self {
            Self::Case(_) => Source::CaseFlow,
            Self::Task { .. } => Source::TaskSystem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ActivityCode, OrgUnit};
    use chrono::TimeZone;

    #[test]
    fn accessors_cover_both_variants() {
        let ts = Utc.timestamp_opt(1000, 0).single().expect("valid timestamp");

        let case_event = Event::Case(StatusChanged {
            case_ref: CaseRef::from("b-1"),
            timestamp: ts,
            status: CaseStatus::Opened,
            activity_code: None,
            last_completed_activity: None,
            last_worker: None,
            wait_reason: None,
            step_outcome: None,
        });
        assert_eq!(case_event.case_ref(), &CaseRef::from("b-1"));
        assert_eq!(case_event.timestamp(), ts);
        assert_eq!(case_event.source(), Source::CaseFlow);

        let task_event = Event::Task {
            case_ref: CaseRef::from("b-1"),
            event: TaskEvent {
                timestamp: ts,
                kind: TaskEventKind::Created,
                activity_code: ActivityCode::from("5003"),
                unit: OrgUnit::from("4806"),
                reserved_by: None,
            },
        };
        assert_eq!(task_event.case_ref(), &CaseRef::from("b-1"));
        assert_eq!(task_event.source(), Source::TaskSystem);
    }
}
