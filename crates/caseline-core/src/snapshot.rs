//! Snapshot computation: flatten, sort, fold.
//!
//! [`snapshots`] combines a case's own status-transition history with the
//! events of its associated tasks, stable-sorts the union by timestamp, and
//! folds it with [`reduce`](crate::reduce::reduce) from the empty state,
//! emitting one [`Snapshot`] per event. Snapshots are computed on demand and
//! never persisted.
//!
//! # Determinism
//!
//! The sort is stable and the fold has no lookahead, so the result for any
//! prefix of the sorted sequence is independent of the suffix, and identical
//! inputs always yield identical output. On equal timestamps task events
//! sort before case events because they are flattened first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::case::{CaseStatus, StatusChanged};
use crate::event::task::Task;
use crate::event::Event;
use crate::ids::{ActivityCode, CaseRef, OrgUnit, Worker};
use crate::reduce::{CaseState, reduce};

/// Point-in-time reconciliation state, tagged with the event that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Business timestamp of the event this snapshot reflects.
    pub timestamp: DateTime<Utc>,
    /// The case the snapshot belongs to.
    pub case_ref: CaseRef,
    /// Case status after the event.
    pub status: Option<CaseStatus>,
    /// Open activity after the event.
    pub activity_code: Option<ActivityCode>,
    /// Worker holding the case after the event.
    pub worker: Option<Worker>,
    /// Unit the open activity is routed to after the event.
    pub unit: Option<OrgUnit>,
}

/// Compute the snapshot series for one case.
///
/// Tasks without a case reference, or referencing a different case, are
/// dropped silently — they carry no information about this case.
#[must_use]
pub fn snapshots(case_ref: &CaseRef, history: &[StatusChanged], tasks: &[Task]) -> Vec<Snapshot> {
    let mut events: Vec<Event> = Vec::with_capacity(
        history.len() + tasks.iter().map(|task| task.events.len()).sum::<usize>(),
    );

    for task in tasks {
        let Some(task_ref) = &task.case_ref else {
            tracing::debug!(case_ref = %case_ref, "dropping task without case reference");
            continue;
        };
        if task_ref != case_ref {
            tracing::debug!(
                case_ref = %case_ref,
                task_ref = %task_ref,
                "dropping task referencing another case"
            );
            continue;
        }
        events.extend(task.events.iter().cloned().map(|event| Event::Task {
            case_ref: task_ref.clone(),
            event,
        }));
    }
    events.extend(history.iter().cloned().map(Event::Case));

    // Stable: ties keep the flatten order (task events before case events).
    events.sort_by_key(Event::timestamp);

    let mut state = CaseState::default();
    let mut series = Vec::with_capacity(events.len());
    for event in &events {
        state = reduce(&state, event);
        series.push(Snapshot {
            timestamp: event.timestamp(),
            case_ref: case_ref.clone(),
            status: state.status,
            activity_code: state.activity_code.clone(),
            worker: state.worker.clone(),
            unit: state.unit.clone(),
        });
    }
    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::case::StepOutcome;
    use crate::event::task::{TaskEvent, TaskEventKind};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    fn case_ref() -> CaseRef {
        CaseRef::from("b-1")
    }

    fn opened(secs: i64, activity: &str) -> StatusChanged {
        StatusChanged {
            case_ref: case_ref(),
            timestamp: at(secs),
            status: CaseStatus::Opened,
            activity_code: Some(ActivityCode::from(activity)),
            last_completed_activity: None,
            last_worker: None,
            wait_reason: None,
            step_outcome: None,
        }
    }

    fn switched(secs: i64, from: &str, to: &str) -> StatusChanged {
        StatusChanged {
            case_ref: case_ref(),
            timestamp: at(secs),
            status: CaseStatus::UnderProcessing,
            activity_code: Some(ActivityCode::from(to)),
            last_completed_activity: Some(ActivityCode::from(from)),
            last_worker: None,
            wait_reason: None,
            step_outcome: Some(StepOutcome::Completed),
        }
    }

    fn task(events: Vec<TaskEvent>) -> Task {
        Task {
            case_ref: Some(case_ref()),
            events,
        }
    }

    fn task_event(
        secs: i64,
        kind: TaskEventKind,
        activity: &str,
        reserved_by: Option<&str>,
    ) -> TaskEvent {
        TaskEvent {
            timestamp: at(secs),
            kind,
            activity_code: ActivityCode::from(activity),
            unit: OrgUnit::from("4806"),
            reserved_by: reserved_by.map(Worker::from),
        }
    }

    #[test]
    fn reserve_then_close_round_trips_assignment() {
        // Open on 5003, reserve by A at U, then close: (None,None) → (A,U) → (None,None).
        let history = vec![opened(10, "5003")];
        let tasks = vec![task(vec![
            task_event(20, TaskEventKind::Reserved, "5003", Some("A")),
            task_event(30, TaskEventKind::Closed, "5003", None),
        ])];

        let series = snapshots(&case_ref(), &history, &tasks);
        assert_eq!(series.len(), 3);

        assert_eq!(series[0].worker, None);
        assert_eq!(series[0].unit, None);

        assert_eq!(series[1].worker, Some(Worker::from("A")));
        assert_eq!(series[1].unit, Some(OrgUnit::from("4806")));

        assert_eq!(series[2].worker, None);
        assert_eq!(series[2].unit, None);
        assert_eq!(series[2].timestamp, at(30));
    }

    #[test]
    fn activity_switch_drops_assignment_until_resupplied() {
        let history = vec![opened(10, "5003"), switched(40, "5003", "5006")];
        let tasks = vec![task(vec![task_event(
            20,
            TaskEventKind::Reserved,
            "5003",
            Some("A"),
        )])];

        let series = snapshots(&case_ref(), &history, &tasks);
        assert_eq!(series.len(), 3);

        let after_switch = &series[2];
        assert_eq!(after_switch.activity_code, Some(ActivityCode::from("5006")));
        assert_eq!(after_switch.worker, None);
        assert_eq!(after_switch.unit, None);
    }

    #[test]
    fn caseless_and_foreign_tasks_are_dropped() {
        let history = vec![opened(10, "5003")];
        let tasks = vec![
            Task {
                case_ref: None,
                events: vec![task_event(20, TaskEventKind::Reserved, "5003", Some("A"))],
            },
            Task {
                case_ref: Some(CaseRef::from("b-2")),
                events: vec![task_event(25, TaskEventKind::Reserved, "5003", Some("B"))],
            },
        ];

        let series = snapshots(&case_ref(), &history, &tasks);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].worker, None);
    }

    #[test]
    fn equal_timestamps_sort_task_events_first() {
        // A reservation and an activity switch at the same instant: the
        // reservation applies to the old activity, then the switch drops it.
        let history = vec![opened(10, "5003"), switched(20, "5003", "5006")];
        let tasks = vec![task(vec![task_event(
            20,
            TaskEventKind::Reserved,
            "5003",
            Some("A"),
        )])];

        let series = snapshots(&case_ref(), &history, &tasks);
        assert_eq!(series.len(), 3);
        assert_eq!(series[1].worker, Some(Worker::from("A")));
        assert_eq!(series[2].worker, None);
    }

    #[test]
    fn result_is_a_pure_function_of_the_input() {
        let history = vec![opened(10, "5003"), switched(40, "5003", "5006")];
        let tasks = vec![task(vec![
            task_event(20, TaskEventKind::Reserved, "5003", Some("A")),
            task_event(30, TaskEventKind::Unreserved, "5003", None),
        ])];

        let first = snapshots(&case_ref(), &history, &tasks);
        let second = snapshots(&case_ref(), &history, &tasks);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_inputs_yield_empty_series() {
        assert!(snapshots(&case_ref(), &[], &[]).is_empty());
    }
}
