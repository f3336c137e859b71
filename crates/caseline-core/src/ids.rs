//! Strongly-typed identifiers shared by both event streams.
//!
//! All four are thin wrappers over externally-assigned strings: the case
//! reference is the stable identity of the output feed, activity codes are
//! the numeric step codes of the case flow (e.g. "5003"), units are
//! four-digit organizational unit codes, and workers are caseworker idents.
//! Keeping them as distinct types prevents mixing them up at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// External reference of a case under processing.
///
/// This is the identity of the output feed: every persisted record for the
/// same case carries the same `CaseRef`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseRef(String);

impl CaseRef {
    /// Wrap an externally-assigned case reference.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaseRef {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Step code of a case-flow activity (e.g. "5003").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityCode(String);

impl ActivityCode {
    /// Wrap an activity step code.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActivityCode {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Four-digit organizational unit code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgUnit(String);

impl OrgUnit {
    /// Wrap an organizational unit code.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrgUnit {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Caseworker identifier as assigned by the task system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Worker(String);

impl Worker {
    /// Wrap a caseworker identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Worker {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_raw() {
        let case = CaseRef::new("b-140523");
        assert_eq!(case.to_string(), "b-140523");
        assert_eq!(case.as_str(), "b-140523");
    }

    #[test]
    fn serde_is_transparent() {
        let unit = OrgUnit::new("4806");
        let json = serde_json::to_string(&unit).expect("serialize");
        assert_eq!(json, "\"4806\"");

        let back: OrgUnit = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, unit);
    }

    #[test]
    fn equality_is_by_value() {
        assert_eq!(Worker::from("Z990123"), Worker::new("Z990123"));
        assert_ne!(ActivityCode::from("5003"), ActivityCode::from("5006"));
    }
}
