//! Task stream: work-item lifecycle events from the task-assignment system.
//!
//! A [`Task`] is the unit the task system schedules: it belongs to at most
//! one case and carries its own ordered event history. Task events are the
//! only source of organizational-unit facts, and the only source of worker
//! facts while an activity is in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{ActivityCode, CaseRef, OrgUnit, Worker};

/// The five lifecycle events a task goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEventKind {
    /// The task was created and routed to a unit.
    Created,
    /// A worker reserved the task.
    Reserved,
    /// The reservation was released without finishing the task.
    Unreserved,
    /// The task was finished and closed.
    Closed,
    /// Routing or metadata changed (unit move, re-reservation).
    Updated,
}

impl TaskEventKind {
    /// Canonical string form, used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Reserved => "RESERVED",
            Self::Unreserved => "UNRESERVED",
            Self::Closed => "CLOSED",
            Self::Updated => "UPDATED",
        }
    }
}

impl fmt::Display for TaskEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle event of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Business timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// What happened to the task.
    pub kind: TaskEventKind,
    /// The case-flow activity this task implements.
    pub activity_code: ActivityCode,
    /// Unit the task is routed to at this point.
    pub unit: OrgUnit,
    /// Worker holding the reservation, if any.
    pub reserved_by: Option<Worker>,
}

/// A task with its ordered event history.
///
/// `case_ref` is `None` for tasks the task system never associated with a
/// case; those are dropped at flattening time and never reach the reducer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// The case this task belongs to, if any.
    pub case_ref: Option<CaseRef>,
    /// Lifecycle events, oldest first.
    pub events: Vec<TaskEvent>,
}

impl Task {
    /// The most recent event of this task, by timestamp.
    #[must_use]
    pub fn last_event(&self) -> Option<&TaskEvent> {
        self.events.iter().max_by_key(|event| event.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    fn event(secs: i64, kind: TaskEventKind) -> TaskEvent {
        TaskEvent {
            timestamp: at(secs),
            kind,
            activity_code: ActivityCode::from("5003"),
            unit: OrgUnit::from("4806"),
            reserved_by: None,
        }
    }

    #[test]
    fn last_event_is_by_timestamp_not_position() {
        let task = Task {
            case_ref: Some(CaseRef::from("b-1")),
            events: vec![
                event(30, TaskEventKind::Closed),
                event(10, TaskEventKind::Created),
                event(20, TaskEventKind::Reserved),
            ],
        };
        let last = task.last_event().expect("non-empty");
        assert_eq!(last.kind, TaskEventKind::Closed);
        assert_eq!(last.timestamp, at(30));
    }

    #[test]
    fn last_event_of_empty_task_is_none() {
        let task = Task {
            case_ref: None,
            events: vec![],
        };
        assert!(task.last_event().is_none());
    }
}
