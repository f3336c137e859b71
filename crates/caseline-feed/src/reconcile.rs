//! Full-history re-derivation under the timestamp-preservation invariant.
//!
//! The warehouse keys on `change_time`. Re-deriving a case's history may
//! correct any derived field, but a `change_time` that has ever been
//! published must survive exactly — altering or removing one would orphan
//! rows on the consumer side. The merge therefore walks the persisted series
//! in order and, for each entry, picks the fields of the time-closest fresh
//! record while keeping the persisted entry's own `change_time`.
//!
//! # Merge walk
//!
//! An index-based two-pointer walk over two ordered series, with a carried
//! "last matched" fresh record. The case analysis is exhaustive over
//! (cursor present?, carry present?, three-way time ordering within the
//! tolerance) — there is no "impossible state" fallthrough:
//!
//! - cursor and carry both absent: the persisted entry survives as-is;
//! - cursor absent: the persisted entry inherits the carry's fields;
//! - cursor within tolerance: consume it, use its fields;
//! - cursor behind: consume it into the carry and look again;
//! - cursor ahead: borrow fields from the time-closest of carry and cursor
//!   *without* consuming — an unconsumed cursor either matches a later
//!   persisted entry or survives as a genuinely new point, and the final
//!   duplicate collapse removes the overlap.
//!
//! Fresh records never consumed represent points in history that were never
//! published; they are added to the output, which is then re-sorted and
//! collapsed, flagged as a resend, and persisted as one batch.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{error, info};

use caseline_core::ids::CaseRef;
use caseline_core::snapshot::snapshots;

use crate::config::FeedConfig;
use crate::lock::CaseLock;
use crate::mapper::RecordMapper;
use crate::record::{CaseRecord, collapse_duplicates, within_tolerance};
use crate::repo::{CaseRepository, RecordSink, TaskRepository};

/// Fatal reconcile defects.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The merge would have altered the published `change_time` set.
    ///
    /// This is a defect in the merge, never a data condition; retrying
    /// would risk corrupting already-published history.
    #[error(
        "reconcile for {case_ref} would alter the published change_time set \
         ({} missing, {} added)",
        missing.len(),
        added.len()
    )]
    TimestampSetChanged {
        /// The affected case.
        case_ref: CaseRef,
        /// Published timestamps that would disappear.
        missing: Vec<DateTime<Utc>>,
        /// Timestamps that would appear without having been published.
        added: Vec<DateTime<Utc>>,
    },
}

/// Result of the pure merge walk.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// One record per persisted entry, fields corrected, timestamps kept.
    pub merged: Vec<CaseRecord>,
    /// Fresh records never consumed: genuinely new points in history.
    pub unconsumed: Vec<CaseRecord>,
}

/// Walk the persisted series against the fresh series.
///
/// Both inputs must be in series order. Pure; see the module docs for the
/// case analysis.
#[must_use]
pub fn merge_preserving_timestamps(
    persisted: &[CaseRecord],
    fresh: &[CaseRecord],
) -> MergeOutcome {
    let mut merged = Vec::with_capacity(persisted.len());
    let mut cursor = 0usize;
    let mut carry: Option<&CaseRecord> = None;

    for entry in persisted {
        loop {
            match (fresh.get(cursor), carry) {
                (None, None) => {
                    merged.push(entry.clone());
                    break;
                }
                (None, Some(matched)) => {
                    merged.push(matched.rekeyed(entry.change_time));
                    break;
                }
                (Some(next), carried) => {
                    if within_tolerance(entry.change_time, next.change_time) {
                        merged.push(next.rekeyed(entry.change_time));
                        carry = Some(next);
                        cursor += 1;
                        break;
                    }
                    match entry.change_time.cmp(&next.change_time) {
                        Ordering::Greater => {
                            // Cursor is behind this entry: consume and look again.
                            carry = Some(next);
                            cursor += 1;
                        }
                        Ordering::Less | Ordering::Equal => {
                            // Cursor is ahead: borrow from whichever fresh
                            // record is time-closest, without consuming.
                            let source =
                                carried.map_or(next, |prev| closest(entry.change_time, prev, next));
                            merged.push(source.rekeyed(entry.change_time));
                            break;
                        }
                    }
                }
            }
        }
    }

    MergeOutcome {
        merged,
        unconsumed: fresh[cursor..].to_vec(),
    }
}

/// The time-closest of two records; ties go to the earlier (the carry).
fn closest<'a>(
    target: DateTime<Utc>,
    a: &'a CaseRecord,
    b: &'a CaseRecord,
) -> &'a CaseRecord {
    if (target - a.change_time).abs() <= (target - b.change_time).abs() {
        a
    } else {
        b
    }
}

/// Check the timestamp-preservation invariant.
///
/// # Errors
///
/// Returns [`ReconcileError::TimestampSetChanged`] when the merged series'
/// `change_time` set differs from the persisted one.
pub fn verify_preserved_timestamps(
    case_ref: &CaseRef,
    persisted: &[CaseRecord],
    merged: &[CaseRecord],
) -> Result<(), ReconcileError> {
    let before: BTreeSet<DateTime<Utc>> =
        persisted.iter().map(|record| record.change_time).collect();
    let after: BTreeSet<DateTime<Utc>> = merged.iter().map(|record| record.change_time).collect();
    if before == after {
        return Ok(());
    }

    let missing: Vec<_> = before.difference(&after).copied().collect();
    let added: Vec<_> = after.difference(&before).copied().collect();
    error!(
        case_ref = %case_ref,
        missing = missing.len(),
        added = added.len(),
        "merge altered the published change_time set; aborting reconcile"
    );
    Err(ReconcileError::TimestampSetChanged {
        case_ref: case_ref.clone(),
        missing,
        added,
    })
}

/// Re-derives and re-publishes a case's full record series.
pub struct Reconciler<C, T, S> {
    cases: C,
    tasks: T,
    sink: S,
    mapper: RecordMapper,
    lock_dir: PathBuf,
    lock_timeout: Duration,
}

impl<C, T, S> Reconciler<C, T, S>
where
    C: CaseRepository,
    T: TaskRepository,
    S: RecordSink,
{
    /// Wire a reconciler from its collaborators and config.
    pub fn new(cases: C, tasks: T, sink: S, config: &FeedConfig) -> Self {
        Self {
            cases,
            tasks,
            sink,
            mapper: RecordMapper::new(config.automatic_unit()),
            lock_dir: config.lock_dir.clone(),
            lock_timeout: config.lock_timeout(),
        }
    }

    /// Recompute the case's record series, merge it against the persisted
    /// series, and persist the corrected history as a full resend.
    ///
    /// # Errors
    ///
    /// Returns an error when a collaborator fails, the case lock cannot be
    /// acquired, or the timestamp-preservation invariant is violated. On
    /// any error nothing has been written.
    pub fn reconcile(&self, case_ref: &CaseRef) -> Result<Vec<CaseRecord>> {
        let _guard = CaseLock::acquire(&self.lock_dir, case_ref, self.lock_timeout)
            .context("acquire case lock")?;

        let persisted = self
            .sink
            .all_for_case(case_ref)
            .context("read persisted series")?;
        let case = self.cases.get(case_ref).context("load case")?;
        let tasks = self
            .tasks
            .tasks_for_case(case_ref)
            .context("load tasks for case")?;

        let series = snapshots(case_ref, &case.history, &tasks);
        let fresh: Vec<CaseRecord> = series
            .iter()
            .map(|snapshot| self.mapper.to_record_at(&case, &tasks, &series, snapshot.timestamp))
            .collect();

        let outcome = merge_preserving_timestamps(&persisted, &fresh);
        verify_preserved_timestamps(case_ref, &persisted, &outcome.merged)?;

        let mut combined = outcome.unconsumed;
        combined.extend(outcome.merged);
        combined.sort_by_key(CaseRecord::ordering_key);

        let mut result = collapse_duplicates(combined);
        let mut sequence = 0i64;
        for record in &mut result {
            record.resend = true;
            record.sequence = sequence;
            sequence += 1;
        }

        if !result.is_empty() {
            self.sink
                .append_many(&result)
                .context("persist reconciled series")?;
        }
        info!(
            case_ref = %case_ref,
            persisted = persisted.len(),
            fresh = fresh.len(),
            published = result.len(),
            "re-published case history"
        );
        Ok(result)
    }
}
