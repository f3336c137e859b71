//! Case-flow stream: status transition events and their enum catalogs.
//!
//! The case-flow system emits one [`StatusChanged`] per status transition.
//! Besides the new status it reports which activity is open on the case,
//! which activity (if any) was just completed, and the worker the flow
//! considers last responsible — the reducer uses these to scope task-derived
//! assignment facts to the activity they belong to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{ActivityCode, CaseRef, Worker};

/// Lifecycle status of a case as reported by the case-flow system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    /// Registered and opened, no processing started.
    Opened,
    /// A caseworker (or the automatic flow) is processing the case.
    UnderProcessing,
    /// Processing is paused pending something external.
    OnHold,
    /// A decision has been made but the case is not yet closed out.
    Decided,
    /// Terminal: the case is closed.
    Closed,
}

impl CaseStatus {
    /// Canonical string form used in the derived status field of records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Opened => "OPENED",
            Self::UnderProcessing => "UNDER_PROCESSING",
            Self::OnHold => "ON_HOLD",
            Self::Decided => "DECIDED",
            Self::Closed => "CLOSED",
        }
    }

    /// Whether this status ends the case's lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a case is on hold. Appended as a suffix to the derived status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitReason {
    /// Waiting for documentation from the user.
    AwaitingDocumentation,
    /// Waiting for the user to answer a query.
    AwaitingUserResponse,
    /// Waiting for data from an external register.
    AwaitingExternalData,
}

impl WaitReason {
    /// Suffix form for the derived status string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingDocumentation => "AWAITING_DOCUMENTATION",
            Self::AwaitingUserResponse => "AWAITING_USER_RESPONSE",
            Self::AwaitingExternalData => "AWAITING_EXTERNAL_DATA",
        }
    }
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-status of the flow step the transition refers to.
///
/// `SentBack` is the return-to-sender signal: a reviewer rejected the step
/// and sent the case back to the caseworker. It drives both the status-string
/// suffix and the outcome rationale of derived records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepOutcome {
    /// The step ran to completion.
    Completed,
    /// The step was sent back by its reviewer.
    SentBack,
}

/// One status transition emitted by the case-flow system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    /// The case this transition belongs to.
    pub case_ref: CaseRef,
    /// Business timestamp of the transition.
    pub timestamp: DateTime<Utc>,
    /// The status the case moved to.
    pub status: CaseStatus,
    /// Activity now open on the case, if any.
    pub activity_code: Option<ActivityCode>,
    /// Activity that was completed by this transition, if any.
    pub last_completed_activity: Option<ActivityCode>,
    /// Worker the case-flow system considers last responsible for the case.
    pub last_worker: Option<Worker>,
    /// Set when the case went on hold.
    pub wait_reason: Option<WaitReason>,
    /// Sub-status of the step this transition refers to.
    pub step_outcome: Option<StepOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_closed_is_terminal() {
        assert!(CaseStatus::Closed.is_terminal());
        for status in [
            CaseStatus::Opened,
            CaseStatus::UnderProcessing,
            CaseStatus::OnHold,
            CaseStatus::Decided,
        ] {
            assert!(!status.is_terminal(), "{status} should not be terminal");
        }
    }

    #[test]
    fn status_strings_are_screaming_snake() {
        assert_eq!(CaseStatus::UnderProcessing.as_str(), "UNDER_PROCESSING");
        assert_eq!(
            WaitReason::AwaitingDocumentation.as_str(),
            "AWAITING_DOCUMENTATION"
        );
    }

    #[test]
    fn serde_uses_the_canonical_strings() {
        let json = serde_json::to_string(&CaseStatus::OnHold).expect("serialize");
        assert_eq!(json, "\"ON_HOLD\"");

        let back: WaitReason =
            serde_json::from_str("\"AWAITING_USER_RESPONSE\"").expect("deserialize");
        assert_eq!(back, WaitReason::AwaitingUserResponse);
    }
}
