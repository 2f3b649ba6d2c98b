// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type

use thiserror::Error;
use zerg_adapters::{AgentError, GitError, LauncherError, PortError, WorktreeError};
use zerg_graph::{AssignError, GraphError};
use zerg_storage::{EscalationError, EventLogError, StoreError};

/// Errors surfaced at the engine boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Assign(#[from] AssignError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    EventLog(#[from] EventLogError),
    #[error(transparent)]
    Escalation(#[from] EscalationError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Worktree(#[from] WorktreeError),
    #[error(transparent)]
    Port(#[from] PortError),
    #[error(transparent)]
    Launcher(#[from] LauncherError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Config(#[from] zerg_core::ConfigError),
    #[error("worker spawn failed: {0}")]
    SpawnFailed(String),
    #[error("no workers could be spawned ({requested} requested, mode {mode})")]
    NoWorkersSpawned { requested: u32, mode: String },
    #[error("{0}")]
    Fatal(String),
}
