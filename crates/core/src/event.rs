// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain events for the append-only event log.
//!
//! Serializes with `{"type": "subject:verb", ...fields}` format. The log is
//! the source of truth for replay and for the status CLI; events are never
//! deleted.

use crate::escalation::EscalationCategory;
use crate::gate::GateOutcome;
use crate::task::{FailureKind, TaskId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Events appended to `.zerg/state/events.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- rush lifecycle --
    #[serde(rename = "rush:started")]
    RushStarted { workers: u32, total_tasks: u32 },

    #[serde(rename = "rush:stopped")]
    RushStopped { force: bool },

    #[serde(rename = "rush:failed")]
    RushFailed { reason: String },

    #[serde(rename = "rush:paused")]
    RushPaused { reason: String },

    #[serde(rename = "rush:resumed")]
    RushResumed,

    #[serde(rename = "error:recoverable")]
    RecoverableError { error: String },

    // -- workers --
    #[serde(rename = "worker:started")]
    WorkerStarted {
        worker_id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container_id: Option<String>,
        mode: String,
    },

    #[serde(rename = "worker:ready")]
    WorkerReady {
        worker_id: u32,
        worktree: PathBuf,
        branch: String,
    },

    #[serde(rename = "worker:stopped")]
    WorkerStopped { worker_id: u32 },

    #[serde(rename = "worker:crashed")]
    WorkerCrashed {
        worker_id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<TaskId>,
    },

    #[serde(rename = "worker:checkpoint")]
    WorkerCheckpoint {
        worker_id: u32,
        tasks_completed: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_task: Option<TaskId>,
    },

    #[serde(rename = "worker:auto_respawn")]
    WorkerAutoRespawn {
        worker_id: u32,
        level: u32,
        respawn_count: u32,
        max_respawn: u32,
    },

    #[serde(rename = "worker:respawn_exhausted")]
    RespawnExhausted {
        level: u32,
        remaining_tasks: u32,
        max_respawn: u32,
    },

    // -- levels --
    #[serde(rename = "level:started")]
    LevelStarted { level: u32, tasks: u32 },

    #[serde(rename = "level:complete")]
    LevelComplete {
        level: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        merge_commit: Option<String>,
    },

    #[serde(rename = "level:paused")]
    LevelPaused { level: u32, failure_rate: f64 },

    #[serde(rename = "level:resumed")]
    LevelResumed { level: u32 },

    // -- merges --
    #[serde(rename = "merge:started")]
    MergeStarted { level: u32 },

    #[serde(rename = "merge:retry")]
    MergeRetry {
        level: u32,
        attempt: u32,
        backoff_seconds: u64,
        error: String,
    },

    #[serde(rename = "merge:complete")]
    MergeComplete { level: u32, merge_commit: String },

    // -- tasks --
    #[serde(rename = "task:claimed")]
    TaskClaimed { task_id: TaskId, worker_id: u32 },

    #[serde(rename = "task:complete")]
    TaskComplete { task_id: TaskId, worker_id: u32 },

    #[serde(rename = "task:failed")]
    TaskFailed {
        task_id: TaskId,
        worker_id: u32,
        error: String,
    },

    #[serde(rename = "task:committed")]
    TaskCommitted {
        task_id: TaskId,
        worker_id: u32,
        branch: String,
        commit: String,
    },

    #[serde(rename = "task:crash_reassign")]
    TaskCrashReassign { task_id: TaskId, worker_id: u32 },

    #[serde(rename = "task:retry_scheduled")]
    TaskRetryScheduled {
        task_id: TaskId,
        retry_count: u32,
        kind: FailureKind,
        ready_at_ms: u64,
    },

    #[serde(rename = "task:stale")]
    TasksStale {
        task_ids: Vec<TaskId>,
        timeout_seconds: u64,
    },

    // -- verification & gates --
    #[serde(rename = "verification:passed")]
    VerificationPassed {
        task_id: TaskId,
        worker_id: u32,
        duration_ms: u64,
    },

    #[serde(rename = "verification:failed")]
    VerificationFailed {
        task_id: TaskId,
        worker_id: u32,
        exit_code: i32,
        stderr: String,
    },

    #[serde(rename = "gate:cached")]
    GateCached { level: u32, gate: String },

    #[serde(rename = "gate:executed")]
    GateExecuted {
        level: u32,
        gate: String,
        outcome: GateOutcome,
    },

    // -- improvement loop --
    #[serde(rename = "loop:completed")]
    LoopCompleted {
        level: u32,
        status: String,
        best_score: f64,
        iterations: u32,
        improvement: f64,
    },

    // -- circuit breaker --
    #[serde(rename = "breaker:opened")]
    BreakerOpened { key: String },

    #[serde(rename = "breaker:closed")]
    BreakerClosed { key: String },

    // -- escalations --
    #[serde(rename = "escalation:raised")]
    EscalationRaised {
        worker_id: u32,
        task_id: TaskId,
        category: EscalationCategory,
    },

    #[serde(rename = "escalation:resolved")]
    EscalationResolved { worker_id: u32, task_id: TaskId },
}

impl Event {
    /// Tag string used on the wire, e.g. `"level:started"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::RushStarted { .. } => "rush:started",
            Event::RushStopped { .. } => "rush:stopped",
            Event::RushFailed { .. } => "rush:failed",
            Event::RushPaused { .. } => "rush:paused",
            Event::RushResumed => "rush:resumed",
            Event::RecoverableError { .. } => "error:recoverable",
            Event::WorkerStarted { .. } => "worker:started",
            Event::WorkerReady { .. } => "worker:ready",
            Event::WorkerStopped { .. } => "worker:stopped",
            Event::WorkerCrashed { .. } => "worker:crashed",
            Event::WorkerCheckpoint { .. } => "worker:checkpoint",
            Event::WorkerAutoRespawn { .. } => "worker:auto_respawn",
            Event::RespawnExhausted { .. } => "worker:respawn_exhausted",
            Event::LevelStarted { .. } => "level:started",
            Event::LevelComplete { .. } => "level:complete",
            Event::LevelPaused { .. } => "level:paused",
            Event::LevelResumed { .. } => "level:resumed",
            Event::MergeStarted { .. } => "merge:started",
            Event::MergeRetry { .. } => "merge:retry",
            Event::MergeComplete { .. } => "merge:complete",
            Event::TaskClaimed { .. } => "task:claimed",
            Event::TaskComplete { .. } => "task:complete",
            Event::TaskFailed { .. } => "task:failed",
            Event::TaskCommitted { .. } => "task:committed",
            Event::TaskCrashReassign { .. } => "task:crash_reassign",
            Event::TaskRetryScheduled { .. } => "task:retry_scheduled",
            Event::TasksStale { .. } => "task:stale",
            Event::VerificationPassed { .. } => "verification:passed",
            Event::VerificationFailed { .. } => "verification:failed",
            Event::GateCached { .. } => "gate:cached",
            Event::GateExecuted { .. } => "gate:executed",
            Event::LoopCompleted { .. } => "loop:completed",
            Event::BreakerOpened { .. } => "breaker:opened",
            Event::BreakerClosed { .. } => "breaker:closed",
            Event::EscalationRaised { .. } => "escalation:raised",
            Event::EscalationResolved { .. } => "escalation:resolved",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
