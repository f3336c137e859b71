//! Per-case production lock.
//!
//! Two concurrent productions for the same case can both read "no existing
//! record" (or the same latest record) before either writes, yielding a
//! duplicate or a double opening-record synthesis. The job runtime does not
//! serialize per case, so the service does: every read-check-write section
//! runs under an exclusive advisory lock keyed by the case reference.
//!
//! The lock is a file lock so that it also holds across worker processes,
//! not just threads. RAII: dropping the guard releases the lock.

use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use caseline_core::ids::CaseRef;

/// Errors acquiring a per-case lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another producer held the case for longer than the timeout.
    #[error("case {case_ref} is locked by another producer (waited {waited:?})")]
    Timeout {
        /// The contended case.
        case_ref: CaseRef,
        /// How long we waited before giving up.
        waited: Duration,
    },

    /// The lock file could not be created or opened.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// RAII guard for the exclusive per-case lock.
#[derive(Debug)]
pub struct CaseLock {
    file: File,
    path: PathBuf,
}

impl CaseLock {
    /// Acquire the lock for `case_ref`, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] when another holder does not release
    /// in time, or [`LockError::Io`] when the lock file cannot be opened.
    pub fn acquire(dir: &Path, case_ref: &CaseRef, timeout: Duration) -> Result<Self, LockError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.lock", sanitize(case_ref.as_str())));

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)?;

            if file.try_lock_exclusive().is_ok() {
                return Ok(Self { file, path });
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    case_ref: case_ref.clone(),
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Explicitly release the lock. Release also happens automatically on drop.
    pub fn release(self) {
        let _ = self.file.unlock();
    }

    /// Return the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CaseLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Case references come from external systems; keep the file name safe.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}
