//! Bounded-retry policy for deferred productions.
//!
//! When a record cannot be produced because the owning unit is not yet
//! resolvable, production is deferred and retried. The policy here is pure
//! decision logic — the job runtime owns the actual delay and re-delivery.
//!
//! The original event time is carried unchanged across every retry: the
//! record must reflect facts-as-of-the-original-event, and only the
//! unit/worker resolution is expected to improve as late task events arrive.
//! At the bound, production runs once more with the missing unit allowed —
//! a record with a null unit beats a lost record.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use caseline_core::ids::CaseRef;

/// Job payload for a deferred production, passed through the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredProduction {
    /// The case to produce for.
    pub case_ref: CaseRef,
    /// Business timestamp of the event that triggered production. Never
    /// re-derived across retries.
    pub original_event_time: DateTime<Utc>,
    /// Retries performed before this run.
    pub retry_count: u32,
}

impl DeferredProduction {
    /// The same job with the retry counter advanced. The original event
    /// time is deliberately untouched.
    #[must_use]
    pub fn with_retry(&self, retry_count: u32) -> Self {
        Self {
            case_ref: self.case_ref.clone(),
            original_event_time: self.original_event_time,
            retry_count,
        }
    }
}

/// What to do after a production attempt still found the unit missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue with the advanced counter after the configured delay.
    Reschedule {
        /// Counter value for the next run.
        next_retry: u32,
        /// How long to wait before the next run.
        delay: Duration,
    },
    /// The bound is reached: produce once with the missing unit allowed,
    /// and do not reschedule.
    FinalAttempt,
}

/// Bounded-retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How many deferred runs may happen before degrading.
    pub max_retries: u32,
    /// Delay between runs.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Decide the next step given how many retries already ran.
    #[must_use]
    pub const fn decide(&self, current_retry: u32) -> RetryDecision {
        if current_retry < self.max_retries {
            RetryDecision::Reschedule {
                next_retry: current_retry + 1,
                delay: self.delay,
            }
        } else {
            RetryDecision::FinalAttempt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            delay: Duration::from_secs(1800),
        }
    }

    #[test]
    fn retries_below_the_bound_reschedule_with_incremented_count() {
        for current in 0..3 {
            match policy().decide(current) {
                RetryDecision::Reschedule { next_retry, delay } => {
                    assert_eq!(next_retry, current + 1);
                    assert_eq!(delay, Duration::from_secs(1800));
                }
                RetryDecision::FinalAttempt => panic!("retry {current} should reschedule"),
            }
        }
    }

    #[test]
    fn the_bound_and_beyond_degrade_to_a_final_attempt() {
        assert_eq!(policy().decide(3), RetryDecision::FinalAttempt);
        assert_eq!(policy().decide(7), RetryDecision::FinalAttempt);
    }

    #[test]
    fn with_retry_never_touches_the_original_event_time() {
        let original = Utc
            .timestamp_opt(1000, 0)
            .single()
            .expect("valid timestamp");
        let job = DeferredProduction {
            case_ref: CaseRef::from("b-1"),
            original_event_time: original,
            retry_count: 0,
        };

        let mut current = job;
        for next in 1..=5 {
            current = current.with_retry(next);
            assert_eq!(current.retry_count, next);
            assert_eq!(current.original_event_time, original);
        }
    }

    #[test]
    fn job_payload_roundtrips_through_json() {
        let job = DeferredProduction {
            case_ref: CaseRef::from("b-1"),
            original_event_time: Utc
                .timestamp_opt(1000, 0)
                .single()
                .expect("valid timestamp"),
            retry_count: 2,
        };
        let json = serde_json::to_string(&job).expect("serialize");
        let back: DeferredProduction = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, job);
    }
}
