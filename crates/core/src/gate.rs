// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Quality gate results and cached artifacts.

use serde::{Deserialize, Serialize};

/// Captured stdout/stderr is truncated to this many bytes in artifacts
/// and events.
pub const OUTPUT_TRUNCATE_BYTES: usize = 500;

/// Outcome of a single gate run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Pass,
    Fail,
    /// The gate command itself could not be executed.
    Error,
    Skip,
}

impl GateOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, GateOutcome::Pass | GateOutcome::Skip)
    }
}

impl std::fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GateOutcome::Pass => "pass",
            GateOutcome::Fail => "fail",
            GateOutcome::Error => "error",
            GateOutcome::Skip => "skip",
        };
        write!(f, "{s}")
    }
}

/// Result of executing (or restoring) one quality gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRunResult {
    pub name: String,
    pub result: GateOutcome,
    pub command: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

impl GateRunResult {
    /// Skipped gate placeholder (e.g. test gates under `--skip-tests`).
    pub fn skipped(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            result: GateOutcome::Skip,
            command: command.into(),
            exit_code: 0,
            duration_ms: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Persisted gate artifact, indexed by `(level, gate_name)` on disk at
/// `.zerg/artifacts/{level}/{gate}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateArtifact {
    pub gate_name: String,
    /// Epoch milliseconds when the gate ran.
    pub timestamp_ms: u64,
    pub result: GateRunResult,
}

impl GateArtifact {
    /// Whether the artifact is still reusable at `now_ms` given a staleness
    /// threshold in seconds. Age exactly at the threshold is still fresh.
    pub fn is_fresh(&self, now_ms: u64, staleness_threshold_seconds: u64) -> bool {
        let age_ms = now_ms.saturating_sub(self.timestamp_ms);
        age_ms <= staleness_threshold_seconds * 1000
    }
}

/// Truncate captured output to [`OUTPUT_TRUNCATE_BYTES`] on a char boundary.
pub fn truncate_output(s: &str) -> String {
    if s.len() <= OUTPUT_TRUNCATE_BYTES {
        return s.to_string();
    }
    let mut end = OUTPUT_TRUNCATE_BYTES;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
