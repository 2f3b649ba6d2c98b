// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker lifecycle: spawn, initialization, termination, exit handling.
//!
//! Each slot gets a port, a worktree on its own branch, and a launched
//! process/container. Resources are reclaimed on termination and exits
//! respawn the slot while the level still has pending work.

use crate::error::EngineError;
use crate::levels::LevelProgress;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use zerg_adapters::{Launcher, PortAllocator, SpawnRequest, WorktreeManager};
use zerg_core::{
    Clock, Event, ResolvedCapabilities, TaskStatus, WorkerRecord, WorkerStatus, ZergConfig,
};
use zerg_graph::TaskGraph;
use zerg_storage::StateStore;

const INIT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Spawns and reaps workers.
pub struct WorkerManager {
    feature: String,
    repo_root: PathBuf,
    config: ZergConfig,
    capabilities: ResolvedCapabilities,
    launcher: Arc<dyn Launcher>,
    worktrees: WorktreeManager,
    ports: PortAllocator,
    clock: Arc<dyn Clock>,
    /// Target worker count for respawns (set by the first spawn wave).
    target_count: u32,
    running: bool,
}

impl WorkerManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feature: String,
        repo_root: PathBuf,
        config: ZergConfig,
        capabilities: ResolvedCapabilities,
        launcher: Arc<dyn Launcher>,
        worktrees: WorktreeManager,
        ports: PortAllocator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            feature,
            repo_root,
            config,
            capabilities,
            launcher,
            worktrees,
            ports,
            clock,
            target_count: 0,
            running: false,
        }
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn target_count(&self) -> u32 {
        self.target_count
    }

    pub fn worktrees(&self) -> &WorktreeManager {
        &self.worktrees
    }

    /// Environment envelope for one worker.
    fn build_env(&self, worker_id: u32, worktree: &PathBuf, branch: &str, port: u16) -> Vec<(String, String)> {
        let state_dir = self.repo_root.join(".zerg/state");
        let log_dir = self.repo_root.join(&self.config.logging.directory);
        let graph_path = self.repo_root.join(".gsd/tasks/task-graph.json");
        let spec_dir = self.repo_root.join(".gsd/specs").join(&self.feature);

        let mut env = vec![
            ("ZERG_WORKER_ID".to_string(), worker_id.to_string()),
            ("ZERG_FEATURE".to_string(), self.feature.clone()),
            ("ZERG_BRANCH".to_string(), branch.to_string()),
            ("ZERG_WORKTREE".to_string(), worktree.display().to_string()),
            (
                "ZERG_TASK_GRAPH".to_string(),
                graph_path.display().to_string(),
            ),
            ("ZERG_STATE_DIR".to_string(), state_dir.display().to_string()),
            ("ZERG_SPEC_DIR".to_string(), spec_dir.display().to_string()),
            ("ZERG_LOG_DIR".to_string(), log_dir.display().to_string()),
            ("ZERG_PORT".to_string(), port.to_string()),
        ];
        env.extend(self.capabilities.to_env_vars());
        env
    }

    /// Spawn one worker into `worker_id`'s slot.
    pub async fn spawn_worker(
        &mut self,
        store: &mut StateStore,
        worker_id: u32,
    ) -> Result<(), EngineError> {
        info!(worker_id, feature = %self.feature, "spawning worker");
        let port = self.ports.allocate_one()?;
        let worktree = match self.worktrees.create(&self.feature, worker_id).await {
            Ok(info) => info,
            Err(err) => {
                let _ = self.ports.release(port);
                return Err(err.into());
            }
        };

        let request = SpawnRequest {
            worker_id,
            feature: self.feature.clone(),
            worktree_path: worktree.path.clone(),
            branch: worktree.branch.clone(),
            env: self.build_env(worker_id, &worktree.path, &worktree.branch, port),
        };
        let result = self.launcher.spawn(request).await;
        if !result.success {
            let _ = self.ports.release(port);
            let error = result.error.unwrap_or_else(|| "unknown spawn error".into());
            return Err(EngineError::SpawnFailed(error));
        }
        let container_id = result.handle.and_then(|h| h.container_id);

        let mut record = WorkerRecord::new(worker_id, worktree.branch.clone(), worktree.path);
        record.status = WorkerStatus::Running;
        record.port = Some(port);
        record.container_id = container_id.clone();
        record.started_at_ms = Some(self.clock.now_ms());
        store.set_worker_state(record)?;
        store.append_event(Event::WorkerStarted {
            worker_id,
            port: Some(port),
            container_id: container_id.clone(),
            mode: self.launcher.mode().to_string(),
        })?;
        Ok(())
    }

    /// Spawn `count` workers into slots 0..count. Returns how many made it.
    pub async fn spawn_workers(
        &mut self,
        store: &mut StateStore,
        count: u32,
    ) -> Result<u32, EngineError> {
        self.target_count = count;
        let mut spawned = 0;
        for worker_id in 0..count {
            match self.spawn_worker(store, worker_id).await {
                Ok(()) => spawned += 1,
                Err(err) => error!(worker_id, error = %err, "failed to spawn worker"),
            }
        }
        Ok(spawned)
    }

    /// Poll until every live worker reports ready (or the timeout).
    /// Workers that die during init are reaped. Returns whether any
    /// worker survives.
    pub async fn wait_for_initialization(
        &mut self,
        store: &mut StateStore,
        timeout: Duration,
    ) -> Result<bool, EngineError> {
        info!("waiting for workers to initialize");
        let started = std::time::Instant::now();

        loop {
            store.load()?;
            let worker_ids: Vec<u32> = store
                .state()
                .workers
                .values()
                .filter(|w| w.status.is_active())
                .map(|w| w.worker_id)
                .collect();

            if worker_ids.is_empty() {
                error!("all workers failed during initialization");
                return Ok(false);
            }

            let mut all_ready = true;
            for worker_id in worker_ids {
                let status = self.launcher.monitor(worker_id).await;
                if status.is_ready_for_tasks() {
                    let ready_recorded = store
                        .state()
                        .workers
                        .get(&worker_id)
                        .and_then(|w| w.ready_at_ms)
                        .is_some();
                    if !ready_recorded {
                        store.set_worker_ready(worker_id)?;
                    }
                } else if status.is_terminal() {
                    warn!(worker_id, %status, "worker failed during initialization");
                    self.reap_worker(store, worker_id, status).await?;
                } else {
                    all_ready = false;
                }
            }

            if all_ready {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "workers initialized",
                );
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                warn!("initialization timeout; continuing with ready workers");
                return Ok(true);
            }
            tokio::time::sleep(INIT_POLL_INTERVAL).await;
        }
    }

    /// Stop a worker and reclaim its resources.
    pub async fn terminate_worker(
        &mut self,
        store: &mut StateStore,
        worker_id: u32,
        force: bool,
    ) -> Result<(), EngineError> {
        info!(worker_id, force, "terminating worker");
        self.launcher.terminate(worker_id, force).await;
        self.release_resources(store, worker_id).await?;

        let record = store.state().workers.get(&worker_id).cloned();
        if let Some(mut record) = record {
            record.status = WorkerStatus::Stopped;
            record.current_task = None;
            store.set_worker_state(record)?;
        }
        store.append_event(Event::WorkerStopped { worker_id })?;
        Ok(())
    }

    /// Handle a worker that exited on its own (clean stop, checkpoint, or
    /// crash already recorded by the orchestrator). Reclaims resources and
    /// respawns the slot while the current level still has pending work.
    pub async fn handle_worker_exit(
        &mut self,
        store: &mut StateStore,
        graph: &TaskGraph,
        worker_id: u32,
        exit_status: WorkerStatus,
    ) -> Result<(), EngineError> {
        info!(worker_id, %exit_status, "handling worker exit");

        // A clean exit should not leave a claimed task behind; if it did,
        // give the task back to the pool without touching retry budget.
        let abandoned = store
            .state()
            .workers
            .get(&worker_id)
            .and_then(|w| w.current_task.clone());
        if let Some(task_id) = abandoned {
            let in_progress = store
                .state()
                .tasks
                .get(&task_id)
                .map(|r| r.is_in_progress() || r.status() == TaskStatus::Paused)
                .unwrap_or(false);
            if in_progress {
                warn!(worker_id, task_id = %task_id, "exited worker abandoned task; resetting");
                store.reset_task_to_pending(&task_id)?;
            }
        }

        self.release_resources(store, worker_id).await?;
        let record = store.state().workers.get(&worker_id).cloned();
        if let Some(mut record) = record {
            record.status = exit_status;
            record.current_task = None;
            store.set_worker_state(record)?;
        }

        // Respawn the slot while there is still work at the current level
        let current_level = store.state().current_level;
        let progress = LevelProgress::new(graph, store.state());
        let remaining = progress.pending_tasks_for_level(current_level);
        if self.running && !remaining.is_empty() {
            info!(worker_id, remaining = remaining.len(), "respawning slot");
            if let Err(err) = self.spawn_worker(store, worker_id).await {
                error!(worker_id, error = %err, "failed to respawn worker");
            }
        }
        Ok(())
    }

    /// Spawn fresh workers for a new level, reusing free slots.
    pub async fn respawn_workers_for_level(
        &mut self,
        store: &mut StateStore,
        graph: &TaskGraph,
        level: u32,
    ) -> Result<u32, EngineError> {
        store.load()?;
        let progress = LevelProgress::new(graph, store.state());
        let remaining = progress.pending_tasks_for_level(level);
        if remaining.is_empty() {
            return Ok(0);
        }

        let active: Vec<u32> = store
            .state()
            .workers
            .values()
            .filter(|w| w.status.is_active())
            .map(|w| w.worker_id)
            .collect();
        let target = self.target_count.max(1);
        let need = (target as usize)
            .saturating_sub(active.len())
            .min(remaining.len());
        if need == 0 {
            return Ok(0);
        }

        info!(level, need, remaining = remaining.len(), "respawning workers for level");
        let mut spawned = 0;
        let free_slots: Vec<u32> = (0..target).filter(|id| !active.contains(id)).collect();
        for worker_id in free_slots.into_iter().take(need) {
            match self.spawn_worker(store, worker_id).await {
                Ok(()) => spawned += 1,
                Err(err) => error!(worker_id, error = %err, "failed to respawn worker"),
            }
        }
        if spawned > 0 {
            self.wait_for_initialization(store, Duration::from_secs(300))
                .await?;
        }
        Ok(spawned)
    }

    /// Terminate every active worker (shutdown path).
    pub async fn terminate_all(
        &mut self,
        store: &mut StateStore,
        force: bool,
    ) -> Result<(), EngineError> {
        let worker_ids: Vec<u32> = store
            .state()
            .workers
            .values()
            .filter(|w| w.status.is_active())
            .map(|w| w.worker_id)
            .collect();
        for worker_id in worker_ids {
            if let Err(err) = self.terminate_worker(store, worker_id, force).await {
                warn!(worker_id, error = %err, "termination failed");
            }
        }
        self.ports.release_all();
        Ok(())
    }

    /// Release a dead worker's resources and record its terminal status.
    async fn reap_worker(
        &mut self,
        store: &mut StateStore,
        worker_id: u32,
        status: WorkerStatus,
    ) -> Result<(), EngineError> {
        self.release_resources(store, worker_id).await?;
        let record = store.state().workers.get(&worker_id).cloned();
        if let Some(mut record) = record {
            record.status = status;
            record.current_task = None;
            store.set_worker_state(record)?;
        }
        Ok(())
    }

    async fn release_resources(
        &mut self,
        store: &mut StateStore,
        worker_id: u32,
    ) -> Result<(), EngineError> {
        let record = store.state().workers.get(&worker_id).cloned();
        if let Some(record) = record {
            if let Some(port) = record.port {
                let _ = self.ports.release(port);
            }
            if let Err(err) = self.worktrees.delete(&record.worktree_path, false).await {
                warn!(worker_id, error = %err, "worktree cleanup failed");
            }
        }
        Ok(())
    }

    /// Feed store-observed liveness into the launcher's stall detection.
    pub fn record_heartbeats(&self, store: &StateStore) {
        for worker in store.state().workers.values() {
            if let Some(at) = worker.health_check_at_ms {
                self.launcher.record_heartbeat(worker.worker_id, at);
            }
        }
    }
}

#[cfg(test)]
#[path = "worker_mgr_tests.rs"]
mod tests;
