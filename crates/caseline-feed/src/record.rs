//! The output record and its equality domain.
//!
//! A [`CaseRecord`] is one row of the statistics feed. Its identity is the
//! case reference; its ordering key is `(change_time, ingest_time)`. The
//! warehouse keys on the business timestamp, so `change_time` values that
//! have ever been published for a case must never be altered or removed —
//! the reconciler enforces this.
//!
//! # Volatile fields
//!
//! Two records are *semantic duplicates* when they agree on every field
//! except the volatile set `{sequence, resend, ingest_time, change_time,
//! version}`. Duplicate suppression and the post-merge collapse both use
//! this equality, never full struct equality.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use caseline_core::case::HandlingMethod;
use caseline_core::ids::{ActivityCode, CaseRef, OrgUnit, Worker};

/// Tolerance for matching a record's `change_time` against the case's
/// received time (opening detection) and against fresh records during the
/// reconcile merge.
pub const TOLERANCE_MS: i64 = 10;

/// The tolerance as a [`Duration`].
#[must_use]
pub fn tolerance() -> Duration {
    Duration::milliseconds(TOLERANCE_MS)
}

/// Whether two business timestamps are equal within [`TOLERANCE_MS`].
#[must_use]
pub fn within_tolerance(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    (a - b).abs() <= tolerance()
}

/// One row of the statistics feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Identity: the case this record describes.
    pub case_ref: CaseRef,
    /// Business timestamp — when the described state became true.
    pub change_time: DateTime<Utc>,
    /// Technical timestamp — when this record was produced.
    pub ingest_time: DateTime<Utc>,
    /// Per-case sequence number. Volatile.
    pub sequence: i64,
    /// Version of the producing code. Volatile.
    pub version: String,
    /// Set on records re-published by the reconciler. Volatile.
    pub resend: bool,
    /// Derived status string (base status plus suffixes).
    pub status: String,
    /// Derived outcome; `None` while the case is open.
    pub outcome: Option<String>,
    /// Why the outcome is what it is; only for sent-back steps.
    pub outcome_rationale: Option<String>,
    /// Unit owning the case at this point.
    pub owning_unit: Option<OrgUnit>,
    /// Worker assigned to the case at this point.
    pub assigned_worker: Option<Worker>,
    /// When the case was received/registered.
    pub received_time: DateTime<Utc>,
    /// When processing was opened.
    pub opened_time: Option<DateTime<Utc>>,
    /// When the decision was made.
    pub decision_time: Option<DateTime<Utc>>,
    /// When the case was closed out.
    pub completed_time: Option<DateTime<Utc>>,
    /// Manual or automatic handling.
    pub handling: HandlingMethod,
    /// Activity open on the case at this point.
    pub activity_code: Option<ActivityCode>,
}

impl CaseRecord {
    /// Total ordering key within a case's series.
    #[must_use]
    pub const fn ordering_key(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.change_time, self.ingest_time)
    }

    /// Field equality modulo the volatile set.
    #[must_use]
    pub fn is_semantic_duplicate(&self, other: &Self) -> bool {
        self.case_ref == other.case_ref
            && self.status == other.status
            && self.outcome == other.outcome
            && self.outcome_rationale == other.outcome_rationale
            && self.owning_unit == other.owning_unit
            && self.assigned_worker == other.assigned_worker
            && self.received_time == other.received_time
            && self.opened_time == other.opened_time
            && self.decision_time == other.decision_time
            && self.completed_time == other.completed_time
            && self.handling == other.handling
            && self.activity_code == other.activity_code
    }

    /// Whether this record qualifies as the opening record of a case whose
    /// received time is `received`.
    #[must_use]
    pub fn is_opening_for(&self, received: DateTime<Utc>) -> bool {
        within_tolerance(self.change_time, received)
    }

    /// Clone with a different business timestamp. Used by the reconcile
    /// merge, which takes fields from a fresh record but must keep the
    /// persisted `change_time`.
    #[must_use]
    pub fn rekeyed(&self, change_time: DateTime<Utc>) -> Self {
        Self {
            change_time,
            ..self.clone()
        }
    }
}

/// Collapse consecutive semantic duplicates, keeping the first of each run.
///
/// The input must already be in series order; only neighbours are compared.
#[must_use]
pub fn collapse_duplicates(records: Vec<CaseRecord>) -> Vec<CaseRecord> {
    let mut out: Vec<CaseRecord> = Vec::with_capacity(records.len());
    for record in records {
        if out
            .last()
            .is_some_and(|prev| prev.is_semantic_duplicate(&record))
        {
            continue;
        }
        out.push(record);
    }
    out
}
