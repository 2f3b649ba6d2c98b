// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess launcher backend.
//!
//! Workers run as child processes in their own process group so that
//! termination reaches descendants. stdout/stderr stream to
//! `{log_dir}/workers/{id}.stdout.log` / `.stderr.log`.

use super::{
    classify_exit, Launcher, LauncherConfig, LauncherMode, SpawnRequest, SpawnResult, WorkerHandle,
};
use crate::subprocess::TERMINATE_GRACE;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::process::{Child, Command};
use tracing::{info, warn};
use zerg_core::WorkerStatus;

struct ChildEntry {
    child: Child,
    pid: Option<u32>,
    /// Cached exit status once reaped.
    exit_code: Option<Option<i32>>,
    last_heartbeat_ms: Option<u64>,
    last_stall_verdict: Option<Instant>,
}

/// Launches workers as local child processes.
pub struct SubprocessLauncher {
    config: LauncherConfig,
    children: Mutex<HashMap<u32, ChildEntry>>,
}

impl SubprocessLauncher {
    pub fn new(config: LauncherConfig) -> Self {
        Self {
            config,
            children: Mutex::new(HashMap::new()),
        }
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn reap(entry: &mut ChildEntry) -> Option<Option<i32>> {
        if entry.exit_code.is_some() {
            return entry.exit_code;
        }
        match entry.child.try_wait() {
            Ok(Some(status)) => {
                entry.exit_code = Some(status.code());
                entry.exit_code
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "try_wait failed; treating worker as crashed");
                entry.exit_code = Some(None);
                entry.exit_code
            }
        }
    }
}

#[async_trait]
impl Launcher for SubprocessLauncher {
    fn mode(&self) -> LauncherMode {
        LauncherMode::Subprocess
    }

    async fn spawn(&self, request: SpawnRequest) -> SpawnResult {
        let worker_log_dir = self.config.log_dir.join("workers");
        if let Err(err) = std::fs::create_dir_all(&worker_log_dir) {
            return SpawnResult::failed(format!("failed to create log dir: {err}"));
        }
        let open_log = |suffix: &str| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(worker_log_dir.join(format!("{}.{suffix}.log", request.worker_id)))
        };
        let stdout_log = match open_log("stdout") {
            Ok(file) => file,
            Err(err) => return SpawnResult::failed(format!("failed to open stdout log: {err}")),
        };
        let stderr_log = match open_log("stderr") {
            Ok(file) => file,
            Err(err) => return SpawnResult::failed(format!("failed to open stderr log: {err}")),
        };

        let mut cmd = Command::new(&self.config.worker_program);
        cmd.args(&self.config.worker_args)
            .current_dir(&request.worktree_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_log))
            .stderr(Stdio::from(stderr_log))
            // Workers must not outlive the orchestrator process
            .kill_on_drop(true);
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        match cmd.spawn() {
            Ok(child) => {
                let pid = child.id();
                info!(
                    worker_id = request.worker_id,
                    pid,
                    branch = %request.branch,
                    "spawned worker subprocess",
                );
                self.children.lock().insert(
                    request.worker_id,
                    ChildEntry {
                        child,
                        pid,
                        exit_code: None,
                        last_heartbeat_ms: None,
                        last_stall_verdict: None,
                    },
                );
                SpawnResult::ok(WorkerHandle {
                    worker_id: request.worker_id,
                    pid,
                    container_id: None,
                })
            }
            Err(err) => SpawnResult::failed(format!(
                "failed to spawn {}: {err}",
                self.config.worker_program.display()
            )),
        }
    }

    async fn monitor(&self, worker_id: u32) -> WorkerStatus {
        let mut children = self.children.lock();
        let Some(entry) = children.get_mut(&worker_id) else {
            return WorkerStatus::Stopped;
        };

        if let Some(code) = Self::reap(entry) {
            return classify_exit(code);
        }

        // Alive: check heartbeats for a stall, rate-limited by cooldown
        if let Some(heartbeat) = entry.last_heartbeat_ms {
            let age_ms = Self::now_ms().saturating_sub(heartbeat);
            if age_ms > self.config.stall_timeout.as_millis() as u64 {
                let cooled = entry
                    .last_stall_verdict
                    .map(|at| at.elapsed() >= self.config.stall_cooldown)
                    .unwrap_or(true);
                if cooled {
                    entry.last_stall_verdict = Some(Instant::now());
                    return WorkerStatus::Stalled;
                }
            }
        }
        WorkerStatus::Running
    }

    async fn terminate(&self, worker_id: u32, force: bool) {
        let entry = self.children.lock().remove(&worker_id);
        let Some(mut entry) = entry else {
            return;
        };
        if entry.exit_code.is_some() {
            return;
        }

        info!(worker_id, force, "terminating worker subprocess");
        signal_group(entry.pid, force);
        if !force {
            match tokio::time::timeout(TERMINATE_GRACE, entry.child.wait()).await {
                Ok(_) => return,
                Err(_) => {
                    warn!(worker_id, "worker ignored SIGTERM; killing group");
                    signal_group(entry.pid, true);
                }
            }
        }
        let _ = entry.child.wait().await;
    }

    async fn sync_state(&self) {
        let mut children = self.children.lock();
        for entry in children.values_mut() {
            let _ = Self::reap(entry);
        }
    }

    fn get_handle(&self, worker_id: u32) -> Option<WorkerHandle> {
        self.children
            .lock()
            .get(&worker_id)
            .map(|entry| WorkerHandle {
                worker_id,
                pid: entry.pid,
                container_id: None,
            })
    }

    fn record_heartbeat(&self, worker_id: u32, at_ms: u64) {
        if let Some(entry) = self.children.lock().get_mut(&worker_id) {
            entry.last_heartbeat_ms = Some(at_ms);
        }
    }
}

/// Send SIGTERM (or SIGKILL) to the worker's process group.
fn signal_group(pid: Option<u32>, force: bool) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        if let Some(pid) = pid {
            let group = Pid::from_raw(-(pid as i32));
            let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
            if let Err(err) = kill(group, signal) {
                warn!(pid, ?signal, error = %err, "failed to signal worker group");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (pid, force);
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
