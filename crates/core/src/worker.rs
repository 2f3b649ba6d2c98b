// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker status lattice and persisted worker record.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Worker lifecycle status.
///
/// `Spawning → Initializing → Running/Ready`, then exactly one of
/// `{Running, Idle, Checkpointing, Stalled}` until the worker reaches a
/// terminal `Stopped` or `Crashed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Spawning,
    Initializing,
    Running,
    Ready,
    Idle,
    Checkpointing,
    Stalled,
    Crashed,
    Stopped,
}

impl WorkerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerStatus::Stopped | WorkerStatus::Crashed)
    }

    /// Active workers hold resources (port, worktree) and count toward
    /// the live worker pool.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Workers that have finished initialization and can claim tasks.
    pub fn is_ready_for_tasks(&self) -> bool {
        matches!(
            self,
            WorkerStatus::Running | WorkerStatus::Ready | WorkerStatus::Idle
        )
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerStatus::Spawning => "spawning",
            WorkerStatus::Initializing => "initializing",
            WorkerStatus::Running => "running",
            WorkerStatus::Ready => "ready",
            WorkerStatus::Idle => "idle",
            WorkerStatus::Checkpointing => "checkpointing",
            WorkerStatus::Stalled => "stalled",
            WorkerStatus::Crashed => "crashed",
            WorkerStatus::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Persisted record of a worker slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub worker_id: u32,
    pub status: WorkerStatus,
    pub branch: String,
    pub worktree_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<TaskId>,
    #[serde(default)]
    pub tasks_completed: u32,
    /// Estimated context window usage, 0.0..=1.0.
    #[serde(default)]
    pub context_usage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

impl WorkerRecord {
    pub fn new(worker_id: u32, branch: impl Into<String>, worktree_path: PathBuf) -> Self {
        Self {
            worker_id,
            status: WorkerStatus::Spawning,
            branch: branch.into(),
            worktree_path,
            port: None,
            started_at_ms: None,
            ready_at_ms: None,
            current_task: None,
            tasks_completed: 0,
            context_usage: 0.0,
            health_check_at_ms: None,
            container_id: None,
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
