//! Feed configuration.
//!
//! Everything here has a default so the feed runs unconfigured; a TOML file
//! overrides per field. The orchestration layer decides where the file
//! lives and passes the path in.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use caseline_core::ids::OrgUnit;

use crate::retry::RetryPolicy;

/// Configuration for the production service and reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Deferred runs allowed before producing with a missing unit.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Seconds between deferred runs.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Sentinel unit reported for automatically handled cases.
    #[serde(default = "default_automatic_unit")]
    pub automatic_unit: String,
    /// Directory for per-case lock files.
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
    /// Milliseconds to wait for a contended case lock.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Path of the SQLite record sink.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            automatic_unit: default_automatic_unit(),
            lock_dir: default_lock_dir(),
            lock_timeout_ms: default_lock_timeout_ms(),
            db_path: default_db_path(),
        }
    }
}

impl FeedConfig {
    /// The retry policy expressed by this config.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    /// The sentinel unit as a typed id.
    #[must_use]
    pub fn automatic_unit(&self) -> OrgUnit {
        OrgUnit::new(self.automatic_unit.clone())
    }

    /// Lock acquisition timeout.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn default_max_retries() -> u32 {
    4
}

fn default_retry_delay_secs() -> u64 {
    1800
}

fn default_automatic_unit() -> String {
    "9999".to_string()
}

fn default_lock_dir() -> PathBuf {
    std::env::temp_dir().join("caseline-locks")
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_db_path() -> PathBuf {
    PathBuf::from("caseline.db")
}

/// Load config from a TOML file; a missing file yields the defaults.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<FeedConfig> {
    if !path.exists() {
        return Ok(FeedConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
}
