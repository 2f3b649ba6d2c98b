// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory lockfiles containing `pid:epoch_seconds`.
//!
//! Used both for the feature-scoped lock (one orchestrator per feature) and
//! for the state store's per-mutation exclusive lock. A lock strictly older
//! than [`STALE_AFTER_SECONDS`] is reclaimable; a lock exactly at the
//! boundary is still active. Corrupt or unreadable lock content is treated
//! as reclaimable.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use zerg_core::Clock;

/// A lock older than this many seconds may be reclaimed.
pub const STALE_AFTER_SECONDS: u64 = 7200;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("invalid feature name: {0:?}")]
    InvalidFeatureName(String),
    #[error("timed out waiting for lock {path} after {waited_ms}ms")]
    Timeout { path: String, waited_ms: u64 },
    #[error("lock io error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Reject feature names that would escape the lock directory.
pub fn validate_feature_name(feature: &str) -> Result<(), LockError> {
    let bad = feature.is_empty()
        || feature.contains('/')
        || feature.contains('\\')
        || feature.contains("..");
    if bad {
        return Err(LockError::InvalidFeatureName(feature.to_string()));
    }
    Ok(())
}

/// Advisory lockfile handle. Acquisition creates the file with `O_EXCL`;
/// release validates the recorded pid before unlinking.
#[derive(Clone)]
pub struct Lockfile {
    path: PathBuf,
    pid: u32,
    clock: Arc<dyn Clock>,
}

impl Lockfile {
    pub fn new(path: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            path,
            pid: std::process::id(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempt a single acquisition. Reclaims stale or corrupt locks.
    pub fn try_acquire(&self) -> Result<bool, LockError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| self.io_err(source))?;
        }

        match self.create_exclusive() {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                match self.read_holder() {
                    Some((holder_pid, acquired_at_secs)) => {
                        let age = self.clock.now_secs().saturating_sub(acquired_at_secs);
                        if age > STALE_AFTER_SECONDS {
                            warn!(
                                path = %self.path.display(),
                                holder_pid,
                                age_seconds = age,
                                "reclaiming stale lock",
                            );
                            let _ = std::fs::remove_file(&self.path);
                            Ok(self.create_exclusive().is_ok())
                        } else {
                            Ok(false)
                        }
                    }
                    // Unreadable or corrupt content: reclaim
                    None => {
                        warn!(path = %self.path.display(), "reclaiming corrupt lock");
                        let _ = std::fs::remove_file(&self.path);
                        Ok(self.create_exclusive().is_ok())
                    }
                }
            }
            Err(source) => Err(self.io_err(source)),
        }
    }

    /// Block (bounded) until the lock is acquired. Polling at a fixed
    /// interval gives arrival-order fairness in practice.
    pub fn acquire_blocking(&self, timeout: Duration) -> Result<(), LockError> {
        let poll = Duration::from_millis(25);
        let start = std::time::Instant::now();
        loop {
            if self.try_acquire()? {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: self.path.display().to_string(),
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }
            std::thread::sleep(poll);
        }
    }

    /// Release the lock. Only unlinks when the recorded pid is ours.
    pub fn release(&self) {
        match self.read_holder() {
            Some((holder_pid, _)) if holder_pid == self.pid => {
                if let Err(err) = std::fs::remove_file(&self.path) {
                    warn!(path = %self.path.display(), error = %err, "failed to release lock");
                }
            }
            Some((holder_pid, _)) => {
                warn!(
                    path = %self.path.display(),
                    holder_pid,
                    own_pid = self.pid,
                    "not releasing lock held by another process",
                );
            }
            None => {}
        }
    }

    /// Whether an active (non-stale) lock exists, and its holder pid.
    pub fn check(&self) -> Option<u32> {
        let (holder_pid, acquired_at_secs) = self.read_holder()?;
        let age = self.clock.now_secs().saturating_sub(acquired_at_secs);
        if age > STALE_AFTER_SECONDS {
            None
        } else {
            Some(holder_pid)
        }
    }

    fn create_exclusive(&self) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        let content = format!("{}:{}", self.pid, self.clock.now_secs());
        file.write_all(content.as_bytes())?;
        file.sync_all()
    }

    fn read_holder(&self) -> Option<(u32, u64)> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        let (pid_str, ts_str) = content.trim().split_once(':')?;
        let pid = pid_str.parse().ok()?;
        // Tolerate fractional epoch timestamps from older writers
        let secs = ts_str.parse::<f64>().ok()?;
        if secs < 0.0 {
            return None;
        }
        Some((pid, secs as u64))
    }

    fn io_err(&self, source: std::io::Error) -> LockError {
        LockError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
