//! In-memory collaborators for tests and deterministic simulation.
//!
//! These implement the [`repo`](crate::repo) ports over plain maps and
//! vectors behind mutexes. The scheduler *captures* jobs instead of running
//! them, so a test can drain and redeliver to simulate the at-least-once job
//! runtime one step at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use caseline_core::case::Case;
use caseline_core::event::task::Task;
use caseline_core::ids::CaseRef;

use crate::record::CaseRecord;
use crate::repo::{CaseRepository, JobScheduler, RecordSink, TaskRepository};
use crate::retry::DeferredProduction;

fn locked<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| anyhow!("poisoned memory store"))
}

/// In-memory case repository.
#[derive(Debug, Clone, Default)]
pub struct MemoryCases {
    cases: Arc<Mutex<HashMap<CaseRef, Case>>>,
}

impl MemoryCases {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a case.
    ///
    /// # Panics
    ///
    /// Panics if the store mutex is poisoned.
    pub fn put(&self, case: Case) {
        locked(&self.cases)
            .expect("memory store poisoned")
            .insert(case.case_ref.clone(), case);
    }
}

impl CaseRepository for MemoryCases {
    fn get(&self, case_ref: &CaseRef) -> Result<Case> {
        locked(&self.cases)?
            .get(case_ref)
            .cloned()
            .with_context(|| format!("unknown case {case_ref}"))
    }
}

/// In-memory task repository.
#[derive(Debug, Clone, Default)]
pub struct MemoryTasks {
    tasks: Arc<Mutex<HashMap<CaseRef, Vec<Task>>>>,
}

impl MemoryTasks {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task under the case it references (caseless tasks are kept
    /// under no key and never returned — mirroring the real task system).
    ///
    /// # Panics
    ///
    /// Panics if the store mutex is poisoned.
    pub fn put(&self, case_ref: &CaseRef, task: Task) {
        locked(&self.tasks)
            .expect("memory store poisoned")
            .entry(case_ref.clone())
            .or_default()
            .push(task);
    }
}

impl TaskRepository for MemoryTasks {
    fn tasks_for_case(&self, case_ref: &CaseRef) -> Result<Vec<Task>> {
        Ok(locked(&self.tasks)?
            .get(case_ref)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory record sink.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    rows: Arc<Mutex<Vec<CaseRecord>>>,
}

impl MemorySink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record ever appended, in append order.
    ///
    /// # Panics
    ///
    /// Panics if the store mutex is poisoned.
    #[must_use]
    pub fn appended(&self) -> Vec<CaseRecord> {
        locked(&self.rows).expect("memory store poisoned").clone()
    }
}

impl RecordSink for MemorySink {
    fn latest_for_case(&self, case_ref: &CaseRef) -> Result<Option<CaseRecord>> {
        Ok(locked(&self.rows)?
            .iter()
            .filter(|record| &record.case_ref == case_ref)
            .max_by_key(|record| record.ordering_key())
            .cloned())
    }

    fn all_for_case(&self, case_ref: &CaseRef) -> Result<Vec<CaseRecord>> {
        let mut series: Vec<CaseRecord> = locked(&self.rows)?
            .iter()
            .filter(|record| &record.case_ref == case_ref)
            .cloned()
            .collect();
        series.sort_by_key(CaseRecord::ordering_key);
        Ok(series)
    }

    fn append(&self, record: &CaseRecord) -> Result<()> {
        locked(&self.rows)?.push(record.clone());
        Ok(())
    }

    fn append_many(&self, records: &[CaseRecord]) -> Result<()> {
        locked(&self.rows)?.extend_from_slice(records);
        Ok(())
    }
}

/// Capturing job scheduler: enqueued jobs pile up until a test drains them.
#[derive(Debug, Clone, Default)]
pub struct MemoryScheduler {
    jobs: Arc<Mutex<Vec<(DeferredProduction, Duration)>>>,
}

impl MemoryScheduler {
    /// Empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every captured job, emptying the queue.
    ///
    /// # Panics
    ///
    /// Panics if the store mutex is poisoned.
    #[must_use]
    pub fn drain(&self) -> Vec<(DeferredProduction, Duration)> {
        std::mem::take(&mut *locked(&self.jobs).expect("memory store poisoned"))
    }
}

impl JobScheduler for MemoryScheduler {
    fn reschedule(&self, job: &DeferredProduction, delay: Duration) -> Result<()> {
        locked(&self.jobs)?.push((job.clone(), delay));
        Ok(())
    }
}
