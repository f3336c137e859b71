//! Production service: map, check, dedupe, persist — or defer.
//!
//! One production run for one case maps the current (or as-of) state to a
//! candidate record and persists it unless it is a semantic duplicate of the
//! latest persisted record. Two special paths:
//!
//! - **Opening synthesis**: the first persisted record of a case must sit
//!   within the tolerance of the case's received time. When the first real
//!   candidate arrives later than that, a synthetic "opened" record is
//!   written first so the warehouse sees the case open before anything else.
//! - **Deferral**: a manually handled case without a resolvable owning unit
//!   must not be published — the unit is contractually required. Production
//!   returns [`ProductionResult::MissingUnit`] (a value, not an error) and
//!   the deferred-job wrapper retries under the bounded policy.
//!
//! Every run holds the per-case lock across its read-check-write section;
//! see [`crate::lock`].

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use caseline_core::case::Case;
use caseline_core::ids::{ActivityCode, CaseRef};
use caseline_core::snapshot::snapshots;

use crate::config::FeedConfig;
use crate::lock::CaseLock;
use crate::mapper::RecordMapper;
use crate::record::CaseRecord;
use crate::repo::{CaseRepository, JobScheduler, RecordSink, TaskRepository};
use crate::retry::{DeferredProduction, RetryDecision, RetryPolicy};

/// Outcome of one production run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductionResult {
    /// The candidate was persisted, suppressed as a duplicate, or both
    /// (opening + candidate). Nothing is pending.
    Completed,
    /// The owning unit was not resolvable and the case is manually handled;
    /// nothing was persisted.
    MissingUnit {
        /// The affected case.
        case_ref: CaseRef,
        /// Activity open on the case, for diagnostics.
        activity_code: Option<ActivityCode>,
        /// Business timestamp the production was evaluated at.
        event_time: DateTime<Utc>,
    },
}

/// Produces and persists feed records for single cases.
pub struct Producer<C, T, S, J> {
    cases: C,
    tasks: T,
    sink: S,
    scheduler: J,
    mapper: RecordMapper,
    policy: RetryPolicy,
    lock_dir: PathBuf,
    lock_timeout: Duration,
}

impl<C, T, S, J> Producer<C, T, S, J>
where
    C: CaseRepository,
    T: TaskRepository,
    S: RecordSink,
    J: JobScheduler,
{
    /// Wire a producer from its collaborators and config.
    pub fn new(cases: C, tasks: T, sink: S, scheduler: J, config: &FeedConfig) -> Self {
        Self {
            cases,
            tasks,
            sink,
            scheduler,
            mapper: RecordMapper::new(config.automatic_unit()),
            policy: config.retry_policy(),
            lock_dir: config.lock_dir.clone(),
            lock_timeout: config.lock_timeout(),
        }
    }

    /// Produce a record for the live state of `case_ref`.
    ///
    /// # Errors
    ///
    /// Returns an error when a collaborator fails or the case lock cannot
    /// be acquired. A missing owning unit is not an error — see
    /// [`ProductionResult::MissingUnit`].
    pub fn produce(
        &self,
        case_ref: &CaseRef,
        allow_missing_unit: bool,
    ) -> Result<ProductionResult> {
        self.produce_inner(case_ref, None, allow_missing_unit)
    }

    /// Produce a record for the state of `case_ref` as of
    /// `original_event_time`.
    ///
    /// Case facts are evaluated as of that instant; unit/worker resolution
    /// still sees the current task data. This is the retry path.
    ///
    /// # Errors
    ///
    /// As for [`Self::produce`].
    pub fn produce_at_time(
        &self,
        case_ref: &CaseRef,
        original_event_time: DateTime<Utc>,
        allow_missing_unit: bool,
    ) -> Result<ProductionResult> {
        self.produce_inner(case_ref, Some(original_event_time), allow_missing_unit)
    }

    /// Produce for the live state; on a missing unit, enqueue the first
    /// deferred run instead of giving up.
    ///
    /// # Errors
    ///
    /// As for [`Self::produce`], plus scheduler failures.
    pub fn produce_or_defer(&self, case_ref: &CaseRef) -> Result<ProductionResult> {
        let result = self.produce(case_ref, false)?;
        if let ProductionResult::MissingUnit { event_time, .. } = &result {
            let job = DeferredProduction {
                case_ref: case_ref.clone(),
                original_event_time: *event_time,
                retry_count: 0,
            };
            info!(
                case_ref = %case_ref,
                original_event_time = %event_time,
                "owning unit unresolved; deferring production"
            );
            self.scheduler
                .reschedule(&job, self.policy.delay)
                .context("enqueue deferred production")?;
        }
        Ok(result)
    }

    /// Run one deferred production and apply the retry policy to its result.
    ///
    /// Called by the job runtime for each delivered [`DeferredProduction`].
    ///
    /// # Errors
    ///
    /// Returns an error when a collaborator fails; the job runtime owns
    /// redelivery of failed jobs.
    pub fn run_deferred(&self, job: &DeferredProduction) -> Result<()> {
        match self.produce_at_time(&job.case_ref, job.original_event_time, false)? {
            ProductionResult::Completed => Ok(()),
            ProductionResult::MissingUnit { .. } => match self.policy.decide(job.retry_count) {
                RetryDecision::Reschedule { next_retry, delay } => {
                    debug!(
                        case_ref = %job.case_ref,
                        retry = next_retry,
                        "owning unit still unresolved; rescheduling"
                    );
                    self.scheduler
                        .reschedule(&job.with_retry(next_retry), delay)
                        .context("re-enqueue deferred production")
                }
                RetryDecision::FinalAttempt => {
                    warn!(
                        case_ref = %job.case_ref,
                        retries = job.retry_count,
                        "retries exhausted; producing with missing unit"
                    );
                    self.produce_at_time(&job.case_ref, job.original_event_time, true)?;
                    Ok(())
                }
            },
        }
    }

    fn produce_inner(
        &self,
        case_ref: &CaseRef,
        as_of: Option<DateTime<Utc>>,
        allow_missing_unit: bool,
    ) -> Result<ProductionResult> {
        let _guard = CaseLock::acquire(&self.lock_dir, case_ref, self.lock_timeout)
            .context("acquire case lock")?;

        let case = self.cases.get(case_ref).context("load case")?;
        let tasks = self
            .tasks
            .tasks_for_case(case_ref)
            .context("load tasks for case")?;
        let series = snapshots(case_ref, &case.history, &tasks);

        let candidate = as_of.map_or_else(
            || self.mapper.to_record(&case, &tasks, &series),
            |t| self.mapper.to_record_at(&case, &tasks, &series, t),
        );

        if candidate.owning_unit.is_none()
            && !case.handling.is_automatic()
            && !allow_missing_unit
        {
            return Ok(ProductionResult::MissingUnit {
                case_ref: case_ref.clone(),
                activity_code: case.current_activity().cloned(),
                event_time: candidate.change_time,
            });
        }

        self.persist_if_not_duplicate(&case, candidate)?;
        Ok(ProductionResult::Completed)
    }

    fn persist_if_not_duplicate(&self, case: &Case, mut candidate: CaseRecord) -> Result<()> {
        let mut latest = self
            .sink
            .latest_for_case(&case.case_ref)
            .context("read latest record")?;
        let mut next_sequence = latest.as_ref().map_or(0, |record| record.sequence + 1);

        if latest.is_none() && !candidate.is_opening_for(case.received_time) {
            let mut opening = opening_record(case, &candidate);
            opening.sequence = next_sequence;
            next_sequence += 1;
            info!(
                case_ref = %case.case_ref,
                received_time = %case.received_time,
                "synthesizing opening record"
            );
            self.sink.append(&opening).context("persist opening record")?;
            latest = Some(opening);
        }

        if let Some(previous) = &latest {
            if previous.is_semantic_duplicate(&candidate) {
                debug!(
                    case_ref = %case.case_ref,
                    change_time = %candidate.change_time,
                    "suppressing duplicate record"
                );
                return Ok(());
            }
        }

        candidate.sequence = next_sequence;
        self.sink.append(&candidate).context("persist record")
    }
}

/// The synthetic "case opened" record: the candidate's slow-changing fields
/// with the business timestamp forced to the received time, the status
/// forced to opened, and outcome/decision/completion nulled.
fn opening_record(case: &Case, candidate: &CaseRecord) -> CaseRecord {
    CaseRecord {
        change_time: case.received_time,
        status: caseline_core::event::case::CaseStatus::Opened.as_str().to_string(),
        outcome: None,
        outcome_rationale: None,
        decision_time: None,
        completed_time: None,
        ..candidate.clone()
    }
}
