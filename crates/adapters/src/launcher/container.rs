// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container launcher backend over the docker CLI.
//!
//! The worktree is mounted read-write and the repo root read-only, both at
//! their host paths so the `ZERG_*` path environment stays valid inside
//! the container. Containers carry a `zerg.feature` label for orphan
//! cleanup.

use super::{
    classify_exit, Launcher, LauncherConfig, LauncherMode, SpawnRequest, SpawnResult, WorkerHandle,
};
use crate::subprocess::{run_with_timeout, DOCKER_TIMEOUT};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{info, warn};
use zerg_core::WorkerStatus;

/// Bridge network shared by all ZERG workers.
const NETWORK_NAME: &str = "zerg-net";

/// Launches workers as docker containers.
pub struct ContainerLauncher {
    config: LauncherConfig,
    image: String,
    memory_limit: String,
    cpu_limit: f64,
    repo_root: PathBuf,
    containers: Mutex<HashMap<u32, String>>,
}

impl ContainerLauncher {
    pub fn new(
        config: LauncherConfig,
        image: impl Into<String>,
        memory_limit: impl Into<String>,
        cpu_limit: f64,
        repo_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            image: image.into(),
            memory_limit: memory_limit.into(),
            cpu_limit,
            repo_root: repo_root.into(),
            containers: Mutex::new(HashMap::new()),
        }
    }

    fn container_name(feature: &str, worker_id: u32) -> String {
        format!("zerg-{feature}-worker-{worker_id}")
    }

    async fn docker(args: &[&str]) -> Result<String, String> {
        let mut cmd = Command::new("docker");
        cmd.args(args);
        let description = format!("docker {}", args.first().unwrap_or(&"?"));
        let output = run_with_timeout(cmd, DOCKER_TIMEOUT, &description).await?;
        if !output.status.success() {
            return Err(format!(
                "{description} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Parse `docker inspect` `status:exit_code` output into a worker
    /// status.
    fn classify_inspect(output: &str) -> WorkerStatus {
        let (state, code) = output.split_once(':').unwrap_or((output, ""));
        match state {
            "running" => WorkerStatus::Running,
            "created" | "restarting" => WorkerStatus::Initializing,
            "paused" => WorkerStatus::Stalled,
            "exited" | "dead" => classify_exit(code.parse().ok()),
            _ => WorkerStatus::Stopped,
        }
    }

    /// Remove containers left over from previous runs of this feature.
    pub async fn cleanup_orphans(&self, feature: &str) {
        let filter = format!("label=zerg.feature={feature}");
        match Self::docker(&["ps", "-aq", "--filter", &filter]).await {
            Ok(ids) => {
                for id in ids.lines().filter(|l| !l.is_empty()) {
                    info!(container = id, "removing orphan worker container");
                    if let Err(err) = Self::docker(&["rm", "-f", id]).await {
                        warn!(container = id, error = %err, "orphan cleanup failed");
                    }
                }
            }
            Err(err) => warn!(error = %err, "orphan container listing failed"),
        }
    }
}

#[async_trait]
impl Launcher for ContainerLauncher {
    fn mode(&self) -> LauncherMode {
        LauncherMode::Container
    }

    async fn spawn(&self, request: SpawnRequest) -> SpawnResult {
        let name = Self::container_name(&request.feature, request.worker_id);
        // Replace any stale container with the same name
        let _ = Self::docker(&["rm", "-f", &name]).await;

        let worktree = request.worktree_path.display().to_string();
        let repo = self.repo_root.display().to_string();
        let cpus = self.cpu_limit.to_string();
        let feature_label = format!("zerg.feature={}", request.feature);

        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            name.clone(),
            "--label".into(),
            feature_label,
            "--network".into(),
            NETWORK_NAME.into(),
            "--memory".into(),
            self.memory_limit.clone(),
            "--cpus".into(),
            cpus,
            "-v".into(),
            format!("{worktree}:{worktree}:rw"),
            "-v".into(),
            format!("{repo}:{repo}:ro"),
            "-w".into(),
            worktree,
        ];
        for (key, value) in &request.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        args.push(self.image.clone());
        args.push(self.config.worker_program.display().to_string());
        args.extend(self.config.worker_args.iter().cloned());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        match Self::docker(&arg_refs).await {
            Ok(container_id) => {
                info!(
                    worker_id = request.worker_id,
                    container = %container_id,
                    "spawned worker container",
                );
                self.containers
                    .lock()
                    .insert(request.worker_id, container_id.clone());
                SpawnResult::ok(WorkerHandle {
                    worker_id: request.worker_id,
                    pid: None,
                    container_id: Some(container_id),
                })
            }
            Err(err) => SpawnResult::failed(err),
        }
    }

    async fn monitor(&self, worker_id: u32) -> WorkerStatus {
        let container = { self.containers.lock().get(&worker_id).cloned() };
        let Some(container) = container else {
            return WorkerStatus::Stopped;
        };
        match Self::docker(&[
            "inspect",
            "-f",
            "{{.State.Status}}:{{.State.ExitCode}}",
            &container,
        ])
        .await
        {
            Ok(output) => Self::classify_inspect(&output),
            Err(_) => WorkerStatus::Crashed,
        }
    }

    async fn terminate(&self, worker_id: u32, force: bool) {
        let container = { self.containers.lock().remove(&worker_id) };
        let Some(container) = container else {
            return;
        };
        info!(worker_id, container = %container, force, "terminating worker container");
        let stop_result = if force {
            Self::docker(&["kill", &container]).await
        } else {
            Self::docker(&["stop", "-t", "5", &container]).await
        };
        if let Err(err) = stop_result {
            warn!(container = %container, error = %err, "container stop failed");
        }
        if let Err(err) = Self::docker(&["rm", "-f", &container]).await {
            warn!(container = %container, error = %err, "container remove failed");
        }
    }

    async fn sync_state(&self) {
        let entries: Vec<(u32, String)> = {
            self.containers
                .lock()
                .iter()
                .map(|(id, c)| (*id, c.clone()))
                .collect()
        };
        for (worker_id, container) in entries {
            if Self::docker(&["inspect", "-f", "{{.State.Status}}", &container])
                .await
                .is_err()
            {
                warn!(worker_id, container = %container, "container vanished; dropping handle");
                self.containers.lock().remove(&worker_id);
            }
        }
    }

    fn get_handle(&self, worker_id: u32) -> Option<WorkerHandle> {
        self.containers
            .lock()
            .get(&worker_id)
            .map(|container| WorkerHandle {
                worker_id,
                pid: None,
                container_id: Some(container.clone()),
            })
    }

    async fn ensure_network(&self) -> bool {
        if Self::docker(&["network", "inspect", NETWORK_NAME]).await.is_ok() {
            return true;
        }
        match Self::docker(&["network", "create", NETWORK_NAME]).await {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "docker network creation failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
