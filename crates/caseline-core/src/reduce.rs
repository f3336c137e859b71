//! Pure state fold over the normalized event stream.
//!
//! [`reduce`] is total and side-effect free: given the running [`CaseState`]
//! and one [`Event`] it produces the next state, never failing. The scoping
//! rule is the whole point of the fold: task-derived worker/unit facts apply
//! only while the activity they belong to is the one open on the case, so a
//! change of activity always invalidates inherited assignment facts until a
//! task event re-supplies them for the new activity.

use serde::{Deserialize, Serialize};

use crate::event::{Event, TaskEventKind};
use crate::event::case::CaseStatus;
use crate::ids::{ActivityCode, OrgUnit, Worker};

/// The running reconciliation state of one case.
///
/// Starts empty; every field is `None` until an event supplies it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseState {
    /// Last reported case status.
    pub status: Option<CaseStatus>,
    /// Activity currently open on the case.
    pub activity_code: Option<ActivityCode>,
    /// Worker holding the case, scoped to `activity_code`.
    pub worker: Option<Worker>,
    /// Unit the open activity is routed to, scoped to `activity_code`.
    pub unit: Option<OrgUnit>,
}

/// Fold one event into the state.
///
/// Status transitions always overwrite `status` and `activity_code`. Worker
/// and unit follow the transition table:
///
/// - same activity as before: keep the unit, take the flow's last worker;
/// - first transition of a fresh case (no activity on either side): take the
///   worker, no unit yet;
/// - any other activity switch: drop both.
///
/// Task events are ignored unless they match the open activity; a matching
/// create/reserve/update supplies worker and unit, an unreserve clears the
/// worker, a close clears both.
#[must_use]
pub fn reduce(state: &CaseState, event: &Event) -> CaseState {
    match event {
        Event::Case(change) => {
            let (worker, unit) = if change.activity_code == state.activity_code {
                (change.last_worker.clone(), state.unit.clone())
            } else if state.activity_code.is_none() && change.last_completed_activity.is_none() {
                (change.last_worker.clone(), None)
            } else {
                (None, None)
            };
            CaseState {
                status: Some(change.status),
                activity_code: change.activity_code.clone(),
                worker,
                unit,
            }
        }
        Event::Task { event: task, .. } => {
            if state.activity_code.as_ref() != Some(&task.activity_code) {
                return state.clone();
            }
            match task.kind {
                TaskEventKind::Created | TaskEventKind::Reserved | TaskEventKind::Updated => {
                    CaseState {
                        worker: task.reserved_by.clone(),
                        unit: Some(task.unit.clone()),
                        ..state.clone()
                    }
                }
                TaskEventKind::Unreserved => CaseState {
                    worker: None,
                    ..state.clone()
                },
                TaskEventKind::Closed => CaseState {
                    worker: None,
                    unit: None,
                    ..state.clone()
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::case::StatusChanged;
    use crate::event::task::TaskEvent;
    use crate::ids::CaseRef;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    fn status_event(
        activity: Option<&str>,
        completed: Option<&str>,
        last_worker: Option<&str>,
    ) -> Event {
        Event::Case(StatusChanged {
            case_ref: CaseRef::from("b-1"),
            timestamp: at(100),
            status: CaseStatus::UnderProcessing,
            activity_code: activity.map(ActivityCode::from),
            last_completed_activity: completed.map(ActivityCode::from),
            last_worker: last_worker.map(Worker::from),
            wait_reason: None,
            step_outcome: None,
        })
    }

    fn task_event(kind: TaskEventKind, activity: &str, reserved_by: Option<&str>) -> Event {
        Event::Task {
            case_ref: CaseRef::from("b-1"),
            event: TaskEvent {
                timestamp: at(100),
                kind,
                activity_code: ActivityCode::from(activity),
                unit: OrgUnit::from("4806"),
                reserved_by: reserved_by.map(Worker::from),
            },
        }
    }

    fn state(activity: Option<&str>, worker: Option<&str>, unit: Option<&str>) -> CaseState {
        CaseState {
            status: Some(CaseStatus::UnderProcessing),
            activity_code: activity.map(ActivityCode::from),
            worker: worker.map(Worker::from),
            unit: unit.map(OrgUnit::from),
        }
    }

    #[test]
    fn status_change_on_same_activity_keeps_unit_takes_worker() {
        let next = reduce(
            &state(Some("5003"), Some("A"), Some("4806")),
            &status_event(Some("5003"), None, Some("B")),
        );
        assert_eq!(next.worker, Some(Worker::from("B")));
        assert_eq!(next.unit, Some(OrgUnit::from("4806")));
    }

    #[test]
    fn first_status_change_of_fresh_case_takes_worker_without_unit() {
        let next = reduce(
            &CaseState::default(),
            &status_event(Some("5003"), None, Some("A")),
        );
        assert_eq!(next.worker, Some(Worker::from("A")));
        assert_eq!(next.unit, None);
        assert_eq!(next.activity_code, Some(ActivityCode::from("5003")));
    }

    #[test]
    fn fresh_case_with_completed_activity_drops_worker() {
        // A completed activity on the very first observed transition means
        // history started before us; inherited facts are not trustworthy.
        let next = reduce(
            &CaseState::default(),
            &status_event(Some("5003"), Some("5001"), Some("A")),
        );
        assert_eq!(next.worker, None);
        assert_eq!(next.unit, None);
    }

    #[test]
    fn activity_switch_drops_worker_and_unit() {
        let next = reduce(
            &state(Some("5003"), Some("A"), Some("4806")),
            &status_event(Some("5006"), Some("5003"), Some("A")),
        );
        assert_eq!(next.worker, None);
        assert_eq!(next.unit, None);
        assert_eq!(next.activity_code, Some(ActivityCode::from("5006")));
    }

    #[test]
    fn status_and_activity_are_always_overwritten() {
        let next = reduce(
            &state(Some("5003"), Some("A"), Some("4806")),
            &status_event(None, Some("5003"), None),
        );
        assert_eq!(next.status, Some(CaseStatus::UnderProcessing));
        assert_eq!(next.activity_code, None);
    }

    #[test]
    fn matching_task_reservation_supplies_worker_and_unit() {
        let next = reduce(
            &state(Some("5003"), None, None),
            &task_event(TaskEventKind::Reserved, "5003", Some("A")),
        );
        assert_eq!(next.worker, Some(Worker::from("A")));
        assert_eq!(next.unit, Some(OrgUnit::from("4806")));
    }

    #[test]
    fn task_events_for_another_activity_are_ignored() {
        let before = state(Some("5006"), Some("B"), Some("4812"));
        for kind in [
            TaskEventKind::Created,
            TaskEventKind::Reserved,
            TaskEventKind::Unreserved,
            TaskEventKind::Closed,
            TaskEventKind::Updated,
        ] {
            let next = reduce(&before, &task_event(kind, "5003", Some("A")));
            assert_eq!(next, before, "{kind} for a foreign activity must be a no-op");
        }
    }

    #[test]
    fn unreserve_clears_worker_keeps_unit() {
        let next = reduce(
            &state(Some("5003"), Some("A"), Some("4806")),
            &task_event(TaskEventKind::Unreserved, "5003", None),
        );
        assert_eq!(next.worker, None);
        assert_eq!(next.unit, Some(OrgUnit::from("4806")));
    }

    #[test]
    fn close_clears_worker_and_unit() {
        let next = reduce(
            &state(Some("5003"), Some("A"), Some("4806")),
            &task_event(TaskEventKind::Closed, "5003", None),
        );
        assert_eq!(next.worker, None);
        assert_eq!(next.unit, None);
    }

    #[test]
    fn update_rebinds_reservation() {
        let next = reduce(
            &state(Some("5003"), Some("A"), Some("4806")),
            &task_event(TaskEventKind::Updated, "5003", None),
        );
        // An update without a reservation releases the worker but renews the unit.
        assert_eq!(next.worker, None);
        assert_eq!(next.unit, Some(OrgUnit::from("4806")));
    }

    #[test]
    fn task_event_with_no_open_activity_is_ignored() {
        let before = CaseState::default();
        let next = reduce(&before, &task_event(TaskEventKind::Reserved, "5003", Some("A")));
        assert_eq!(next, before);
    }
}
