// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Level records: execution status, merge status, and task counters.

use serde::{Deserialize, Serialize};

/// Execution status of a level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelStatus {
    #[default]
    Pending,
    Running,
    Complete,
}

impl std::fmt::Display for LevelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LevelStatus::Pending => "pending",
            LevelStatus::Running => "running",
            LevelStatus::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// Merge lifecycle of a level. Level N+1 does not start until level N's
/// merge status is `Complete` (or the run is declared fatally failed).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    #[default]
    None,
    Pending,
    Merging,
    Conflict,
    Complete,
    Failed,
    Rebasing,
}

impl std::fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MergeStatus::None => "none",
            MergeStatus::Pending => "pending",
            MergeStatus::Merging => "merging",
            MergeStatus::Conflict => "conflict",
            MergeStatus::Complete => "complete",
            MergeStatus::Failed => "failed",
            MergeStatus::Rebasing => "rebasing",
        };
        write!(f, "{s}")
    }
}

/// Persisted per-level record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub number: u32,
    #[serde(default)]
    pub status: LevelStatus,
    #[serde(default)]
    pub merge_status: MergeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_commit: Option<String>,
    #[serde(default)]
    pub total_tasks: u32,
    #[serde(default)]
    pub completed_tasks: u32,
    #[serde(default)]
    pub failed_tasks: u32,
}

impl LevelRecord {
    pub fn new(number: u32, total_tasks: u32) -> Self {
        Self {
            number,
            total_tasks,
            ..Self::default()
        }
    }

    /// All tasks accounted for (complete or failed).
    pub fn is_resolved(&self) -> bool {
        self.completed_tasks + self.failed_tasks >= self.total_tasks
    }
}

#[cfg(test)]
#[path = "level_tests.rs"]
mod tests;
