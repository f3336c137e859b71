//! Case metadata as loaded from the case repository.
//!
//! A [`Case`] bundles the slow-changing facts about a case (received time,
//! handling method, outcome code, entitlement periods) with its full
//! status-transition history. The record mapper evaluates the history either
//! live or "as of" a historical instant; the `*_at` accessors exist for the
//! latter so a retried production reflects facts-as-of-the-original-event.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::event::case::{CaseStatus, StatusChanged};
use crate::ids::{ActivityCode, CaseRef, Worker};

/// How the case is being handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandlingMethod {
    /// A caseworker processes the case.
    Manual,
    /// The flow decides without human involvement.
    Automatic,
}

impl HandlingMethod {
    /// Canonical string form, stored in the sink.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::Automatic => "AUTOMATIC",
        }
    }

    /// Whether the flow handles the case without a caseworker.
    #[must_use]
    pub const fn is_automatic(self) -> bool {
        matches!(self, Self::Automatic)
    }
}

impl fmt::Display for HandlingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown handling-method string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownHandlingMethod {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownHandlingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown handling method '{}': expected MANUAL or AUTOMATIC",
            self.raw
        )
    }
}

impl std::error::Error for UnknownHandlingMethod {}

impl FromStr for HandlingMethod {
    type Err = UnknownHandlingMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANUAL" => Ok(Self::Manual),
            "AUTOMATIC" => Ok(Self::Automatic),
            _ => Err(UnknownHandlingMethod { raw: s.to_string() }),
        }
    }
}

/// Decision outcome code of a closed case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeCode {
    /// The claim was granted.
    Granted,
    /// The claim was rejected on its merits.
    Rejected,
    /// The claim was dismissed without a merits decision.
    Dismissed,
    /// The claimant withdrew.
    Withdrawn,
}

impl OutcomeCode {
    /// Canonical string form used in the derived outcome field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "GRANTED",
            Self::Rejected => "REJECTED",
            Self::Dismissed => "DISMISSED",
            Self::Withdrawn => "WITHDRAWN",
        }
    }
}

impl fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of entitlement granted by an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementKind {
    /// The ordinary entitlement.
    Ordinary,
    /// An extension of an earlier entitlement.
    Extension,
    /// A supplement on top of an existing entitlement.
    Supplement,
}

impl EntitlementKind {
    /// Suffix form for the refined outcome string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ordinary => "ORDINARY",
            Self::Extension => "EXTENSION",
            Self::Supplement => "SUPPLEMENT",
        }
    }
}

impl fmt::Display for EntitlementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entitlement period attached to a granted case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    /// What kind of entitlement this period grants.
    pub kind: EntitlementKind,
    /// First day of the period.
    pub from: NaiveDate,
    /// Last day of the period; open-ended when `None`.
    pub to: Option<NaiveDate>,
}

/// A case with its metadata and full status-transition history.
///
/// `history` is ordered oldest-first by the repository contract; the `*_at`
/// accessors tolerate out-of-order entries by scanning rather than assuming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    /// External reference; identity of the feed.
    pub case_ref: CaseRef,
    /// When the case was received/registered.
    pub received_time: DateTime<Utc>,
    /// When processing was opened, if recorded separately.
    pub opened_time: Option<DateTime<Utc>>,
    /// When the decision was made, for decided cases.
    pub decision_time: Option<DateTime<Utc>>,
    /// When the case was closed out.
    pub completed_time: Option<DateTime<Utc>>,
    /// Manual or automatic handling.
    pub handling: HandlingMethod,
    /// Decision outcome, for closed cases.
    pub outcome_code: Option<OutcomeCode>,
    /// The last worker who completed an activity on the case.
    pub last_completing_worker: Option<Worker>,
    /// Entitlement periods granted, for approved cases.
    pub entitlements: Vec<Entitlement>,
    /// Status transitions, oldest first.
    pub history: Vec<StatusChanged>,
}

impl Case {
    /// The most recent status transition, if any.
    #[must_use]
    pub fn last_change(&self) -> Option<&StatusChanged> {
        self.history.iter().max_by_key(|change| change.timestamp)
    }

    /// The most recent status transition at or before `as_of`.
    #[must_use]
    pub fn last_change_at(&self, as_of: DateTime<Utc>) -> Option<&StatusChanged> {
        self.history
            .iter()
            .filter(|change| change.timestamp <= as_of)
            .max_by_key(|change| change.timestamp)
    }

    /// Business timestamp of the last status change, falling back to the
    /// received time for cases with an empty history.
    #[must_use]
    pub fn last_change_time(&self) -> DateTime<Utc> {
        self.last_change()
            .map_or(self.received_time, |change| change.timestamp)
    }

    /// Current status; `Opened` until the first transition arrives.
    #[must_use]
    pub fn status(&self) -> CaseStatus {
        self.last_change()
            .map_or(CaseStatus::Opened, |change| change.status)
    }

    /// Status as of a historical instant.
    #[must_use]
    pub fn status_at(&self, as_of: DateTime<Utc>) -> CaseStatus {
        self.last_change_at(as_of)
            .map_or(CaseStatus::Opened, |change| change.status)
    }

    /// Whether the case is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status().is_terminal()
    }

    /// Activity currently open on the case, if any.
    #[must_use]
    pub fn current_activity(&self) -> Option<&ActivityCode> {
        self.last_change()
            .and_then(|change| change.activity_code.as_ref())
    }
}
