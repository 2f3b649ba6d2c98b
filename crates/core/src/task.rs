// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task definition and runtime status record.
//!
//! A [`Task`] is immutable input loaded from the task graph. Its mutable
//! runtime status lives in a [`TaskRecord`] owned by the state store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

crate::define_id! {
    /// Stable task identifier from the task graph.
    pub struct TaskId;
}

/// File sets a task may touch. `create` and `modify` participate in the
/// per-level ownership invariant; `read` is informational.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFiles {
    #[serde(default)]
    pub create: Vec<String>,
    #[serde(default)]
    pub modify: Vec<String>,
    #[serde(default)]
    pub read: Vec<String>,
}

impl TaskFiles {
    /// Files this task owns at its level (`create ∪ modify`).
    pub fn owned(&self) -> BTreeSet<&str> {
        self.create
            .iter()
            .chain(self.modify.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn total_count(&self) -> usize {
        self.create.len() + self.modify.len() + self.read.len()
    }
}

/// Verification command run by the worker after the agent finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub command: String,
    #[serde(default = "default_verification_timeout")]
    pub timeout_seconds: u64,
}

fn default_verification_timeout() -> u64 {
    30
}

/// Immutable task definition from the task graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub level: u32,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub files: TaskFiles,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate_minutes: Option<u32>,
    /// Pre-built prompt context from the design phase, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Runtime status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Paused,
    Complete,
    Failed,
    Skipped,
}

impl TaskStatus {
    /// Terminal statuses never leave the store without an explicit reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Skipped)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Paused => "paused",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// How a task failure is classified for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network flake, timeout, transient tooling error: retried with backoff.
    Transient,
    /// Missing import or artifact from another task: short delay, limit 2.
    Dependency,
    /// Verification keeps failing: limit 3, then manual retry only.
    Logic,
    /// Infrastructure failure; the retry count is NOT incremented.
    WorkerCrash,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Transient => "transient",
            FailureKind::Dependency => "dependency",
            FailureKind::Logic => "logic",
            FailureKind::WorkerCrash => "worker_crash",
        };
        write!(f, "{s}")
    }
}

/// Mutable per-task status row persisted in the state store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Level copied from the task graph so the store can gate claims
    /// without loading the graph.
    #[serde(default)]
    pub level: u32,
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Classification of the most recent failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// Epoch ms after which a scheduled retry becomes eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_ready_at_ms: Option<u64>,
}

impl TaskRecord {
    pub fn status(&self) -> TaskStatus {
        self.status.unwrap_or(TaskStatus::Pending)
    }

    pub fn is_pending(&self) -> bool {
        self.status() == TaskStatus::Pending
    }

    pub fn is_in_progress(&self) -> bool {
        self.status() == TaskStatus::InProgress
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
