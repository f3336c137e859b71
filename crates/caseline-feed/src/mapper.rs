//! Case + snapshot series → output record.
//!
//! The mapper is where every derived field of the feed is decided. It never
//! fails: absence of derivable data yields `None` fields. The one exception
//! — a missing owning unit on a manually handled case — is not decided here;
//! the production service inspects the mapped record and escalates.
//!
//! # Live vs. historical
//!
//! [`RecordMapper::to_record`] evaluates the case as it stands now.
//! [`RecordMapper::to_record_at`] evaluates case facts (status, last change,
//! decision/completion timestamps) as of a historical instant, while
//! worker/unit still come from the snapshot series computed over the
//! *current* task history — a deferred production is expected to pick up
//! task events that arrived after the original attempt.

use chrono::{DateTime, Utc};
use tracing::warn;

use caseline_core::case::{Case, OutcomeCode};
use caseline_core::event::case::{StatusChanged, StepOutcome};
use caseline_core::event::task::{Task, TaskEvent};
use caseline_core::ids::{OrgUnit, Worker};
use caseline_core::snapshot::Snapshot;

use crate::record::CaseRecord;

/// Derives output records from case state.
#[derive(Debug, Clone)]
pub struct RecordMapper {
    /// Sentinel unit reported for automatically handled cases.
    automatic_unit: OrgUnit,
}

impl RecordMapper {
    /// Create a mapper reporting `automatic_unit` for automatic handling.
    #[must_use]
    pub const fn new(automatic_unit: OrgUnit) -> Self {
        Self { automatic_unit }
    }

    /// Map the live case state to a record.
    #[must_use]
    pub fn to_record(&self, case: &Case, tasks: &[Task], snapshots: &[Snapshot]) -> CaseRecord {
        self.build(case, tasks, snapshots.last(), case.last_change(), None)
    }

    /// Map the case state as of `as_of` to a record.
    ///
    /// The snapshot used is the last one at or before `as_of` in the series
    /// computed from current histories.
    #[must_use]
    pub fn to_record_at(
        &self,
        case: &Case,
        tasks: &[Task],
        snapshots: &[Snapshot],
        as_of: DateTime<Utc>,
    ) -> CaseRecord {
        let snapshot = snapshots
            .iter()
            .rev()
            .find(|snapshot| snapshot.timestamp <= as_of);
        self.build(case, tasks, snapshot, case.last_change_at(as_of), Some(as_of))
    }

    fn build(
        &self,
        case: &Case,
        tasks: &[Task],
        snapshot: Option<&Snapshot>,
        last_change: Option<&StatusChanged>,
        as_of: Option<DateTime<Utc>>,
    ) -> CaseRecord {
        let status = as_of.map_or_else(|| case.status(), |t| case.status_at(t));
        let closed = status.is_terminal();

        CaseRecord {
            case_ref: case.case_ref.clone(),
            change_time: as_of.unwrap_or_else(|| case.last_change_time()),
            ingest_time: Utc::now(),
            sequence: 0,
            version: env!("CARGO_PKG_VERSION").to_string(),
            resend: false,
            status: status_text(status.as_str(), last_change),
            outcome: outcome(case, closed),
            outcome_rationale: outcome_rationale(last_change),
            owning_unit: self.owning_unit(case, tasks, snapshot, closed),
            assigned_worker: assigned_worker(case, tasks, snapshot, closed),
            received_time: case.received_time,
            opened_time: gate(case.opened_time, as_of),
            decision_time: gate(case.decision_time, as_of),
            completed_time: gate(case.completed_time, as_of),
            handling: case.handling,
            activity_code: last_change.and_then(|change| change.activity_code.clone()),
        }
    }

    /// Owning unit: sentinel for automatic handling, else the event-sourced
    /// unit; for closed cases with no event-sourced unit, the unit of the
    /// most-recently-touched task (regardless of activity) as a best effort.
    fn owning_unit(
        &self,
        case: &Case,
        tasks: &[Task],
        snapshot: Option<&Snapshot>,
        closed: bool,
    ) -> Option<OrgUnit> {
        if case.handling.is_automatic() {
            return Some(self.automatic_unit.clone());
        }
        if let Some(unit) = snapshot.and_then(|snapshot| snapshot.unit.clone()) {
            return Some(unit);
        }
        if closed {
            return last_touched(tasks).map(|event| event.unit.clone());
        }
        None
    }
}

/// Assigned worker: the event-sourced worker; for closed cases, the most
/// recent task's reservation, then the case's own last completing worker.
fn assigned_worker(
    case: &Case,
    tasks: &[Task],
    snapshot: Option<&Snapshot>,
    closed: bool,
) -> Option<Worker> {
    if let Some(worker) = snapshot.and_then(|snapshot| snapshot.worker.clone()) {
        return Some(worker);
    }
    if !closed {
        return None;
    }
    last_touched(tasks)
        .and_then(|event| event.reserved_by.clone())
        .or_else(|| case.last_completing_worker.clone())
}

/// The most recent task event across all of the case's tasks.
fn last_touched(tasks: &[Task]) -> Option<&TaskEvent> {
    tasks
        .iter()
        .filter_map(Task::last_event)
        .max_by_key(|event| event.timestamp)
}

/// Base status plus wait-reason and sent-back suffixes.
fn status_text(base: &str, last_change: Option<&StatusChanged>) -> String {
    let mut text = base.to_string();
    if let Some(change) = last_change {
        if let Some(reason) = change.wait_reason {
            text.push('_');
            text.push_str(reason.as_str());
        }
        if change.step_outcome == Some(StepOutcome::SentBack) {
            text.push_str("_SENT_BACK");
        }
    }
    text
}

/// Derived outcome string; `None` while the case is open.
///
/// Approvals are refined by the entitlement periods: the first kind wins.
/// When several kinds exist the choice is recorded as a log note rather
/// than made silently.
fn outcome(case: &Case, closed: bool) -> Option<String> {
    if !closed {
        return None;
    }
    let code = case.outcome_code?;
    if code != OutcomeCode::Granted {
        return Some(code.as_str().to_string());
    }

    let Some(first) = case.entitlements.first() else {
        return Some(code.as_str().to_string());
    };
    if case
        .entitlements
        .iter()
        .any(|entitlement| entitlement.kind != first.kind)
    {
        warn!(
            case_ref = %case.case_ref,
            chosen = %first.kind,
            count = case.entitlements.len(),
            "case has several entitlement kinds; outcome uses the first"
        );
    }
    Some(format!("{}_{}", code.as_str(), first.kind.as_str()))
}

/// Rationale only exists when the last change's step was sent back.
fn outcome_rationale(last_change: Option<&StatusChanged>) -> Option<String> {
    last_change
        .filter(|change| change.step_outcome == Some(StepOutcome::SentBack))
        .map(|_| "SENT_BACK_FROM_REVIEW".to_string())
}

/// Keep a timestamp only if it was known at `as_of`.
fn gate(time: Option<DateTime<Utc>>, as_of: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (time, as_of) {
        (Some(t), Some(cutoff)) if t > cutoff => None,
        _ => time,
    }
}
