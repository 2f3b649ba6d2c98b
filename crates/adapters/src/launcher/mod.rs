// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified worker launcher interface over subprocess and container
//! backends.
//!
//! `spawn` is non-blocking: it starts the worker and returns without
//! waiting for readiness. `monitor` is a cheap classification of the
//! worker's last known state; stall detection derives from heartbeats the
//! orchestrator feeds back via `record_heartbeat`.

pub mod container;
pub mod subprocess;

use crate::subprocess::{run_with_timeout, DOCKER_PROBE_TIMEOUT};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use zerg_core::WorkerStatus;

pub use container::ContainerLauncher;
pub use subprocess::SubprocessLauncher;

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("unsupported launcher mode: {0}")]
    UnsupportedMode(String),
    #[error("container mode requested but docker is unavailable: {0}")]
    DockerUnavailable(String),
}

/// How workers are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LauncherMode {
    Subprocess,
    Container,
    #[default]
    Auto,
}

impl LauncherMode {
    pub fn parse(s: &str) -> Result<Self, LauncherError> {
        match s {
            "subprocess" => Ok(LauncherMode::Subprocess),
            "container" => Ok(LauncherMode::Container),
            "auto" => Ok(LauncherMode::Auto),
            other => Err(LauncherError::UnsupportedMode(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LauncherMode::Subprocess => "subprocess",
            LauncherMode::Container => "container",
            LauncherMode::Auto => "auto",
        }
    }
}

impl std::fmt::Display for LauncherMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shared launcher settings.
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Program + arguments that run the worker protocol (the `zerg`
    /// binary's hidden `worker` subcommand).
    pub worker_program: PathBuf,
    pub worker_args: Vec<String>,
    /// Directory receiving `workers/{id}.stdout.log` / `.stderr.log`.
    pub log_dir: PathBuf,
    pub stall_timeout: Duration,
    /// Minimum spacing between stall verdicts for one worker.
    pub stall_cooldown: Duration,
}

/// Everything a backend needs to start one worker.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub worker_id: u32,
    pub feature: String,
    pub worktree_path: PathBuf,
    pub branch: String,
    /// Full environment envelope (`ZERG_*` identity, paths, capabilities).
    pub env: Vec<(String, String)>,
}

/// Opaque reference to a running worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHandle {
    pub worker_id: u32,
    pub pid: Option<u32>,
    pub container_id: Option<String>,
}

/// Outcome of a spawn attempt.
#[derive(Debug, Clone)]
pub struct SpawnResult {
    pub success: bool,
    pub handle: Option<WorkerHandle>,
    pub error: Option<String>,
}

impl SpawnResult {
    pub fn ok(handle: WorkerHandle) -> Self {
        Self {
            success: true,
            handle: Some(handle),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            handle: None,
            error: Some(error.into()),
        }
    }
}

/// Abstract worker launcher.
#[async_trait]
pub trait Launcher: Send + Sync {
    fn mode(&self) -> LauncherMode;

    /// Start a worker. Non-blocking: does not wait for readiness.
    async fn spawn(&self, request: SpawnRequest) -> SpawnResult;

    /// Cheap status classification from the backend's view.
    async fn monitor(&self, worker_id: u32) -> WorkerStatus;

    /// Graceful stop, then kill after the grace period (`force` skips
    /// straight to kill).
    async fn terminate(&self, worker_id: u32, force: bool);

    /// Reconcile internal handles with backend ground truth.
    async fn sync_state(&self);

    fn get_handle(&self, worker_id: u32) -> Option<WorkerHandle>;

    /// Prepare backend networking (container only). `true` when usable.
    async fn ensure_network(&self) -> bool {
        true
    }

    /// Feed worker-liveness observations into stall detection.
    fn record_heartbeat(&self, _worker_id: u32, _at_ms: u64) {}
}

/// Classify a worker process exit code.
pub(crate) fn classify_exit(code: Option<i32>) -> WorkerStatus {
    match code {
        Some(0) => WorkerStatus::Stopped,
        Some(64) => WorkerStatus::Checkpointing,
        _ => WorkerStatus::Crashed,
    }
}

/// Probe whether the docker daemon is reachable. The single gate for
/// "docker absent".
pub async fn docker_available() -> bool {
    let mut cmd = Command::new("docker");
    cmd.arg("info");
    match run_with_timeout(cmd, DOCKER_PROBE_TIMEOUT, "docker info").await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Resolve `auto` into a concrete mode: container when docker is
/// reachable, subprocess otherwise.
pub async fn detect_launcher_mode(requested: LauncherMode) -> LauncherMode {
    match requested {
        LauncherMode::Auto => {
            if docker_available().await {
                LauncherMode::Container
            } else {
                LauncherMode::Subprocess
            }
        }
        explicit => explicit,
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
