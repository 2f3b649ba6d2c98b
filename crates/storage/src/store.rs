// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authoritative state store for a feature run.
//!
//! One JSON snapshot per feature at `.zerg/state/{feature}.json`, mutated
//! only through [`StateStore`] transactions: acquire the exclusive
//! lockfile, reload from disk, mutate in memory, save atomically, append
//! events, release. Readers may hold any consistent snapshot; writers
//! always reload first.

use crate::events::{EventLog, EventLogError};
use crate::lock::{validate_feature_name, LockError, Lockfile};
use crate::metrics::FeatureMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use zerg_core::{
    Clock, Event, FailureKind, LevelRecord, LevelStatus, MergeStatus, Task, TaskId, TaskRecord,
    TaskStatus, WorkerRecord, WorkerStatus,
};

/// Bounded wait for the store's mutation lock.
const MUTATION_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state io error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("corrupt state file {path}: {source} (refusing to overwrite; manual intervention required)")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    EventLog(#[from] EventLogError),
    #[error("state belongs to a different task graph (stored hash {stored}, graph hash {graph})")]
    GraphMismatch { stored: String, graph: String },
    #[error("unknown task: {0}")]
    TaskNotFound(TaskId),
}

/// Resolves a task's dependencies during an atomic claim.
pub trait DependencyChecker {
    fn dependencies_of(&self, id: &TaskId) -> Vec<TaskId>;
}

/// No-op checker for callers that have no graph (all claims allowed once
/// level-gated).
pub struct NoDependencies;

impl DependencyChecker for NoDependencies {
    fn dependencies_of(&self, _id: &TaskId) -> Vec<TaskId> {
        Vec::new()
    }
}

/// The persisted snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureState {
    pub feature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_hash: Option<String>,
    /// 0 while no level has started.
    #[serde(default)]
    pub current_level: u32,
    #[serde(default)]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub tasks: BTreeMap<TaskId, TaskRecord>,
    #[serde(default)]
    pub workers: BTreeMap<u32, WorkerRecord>,
    #[serde(default)]
    pub levels: BTreeMap<u32, LevelRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<FeatureMetrics>,
}

impl FeatureState {
    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|(_, r)| r.status() == status)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        !self.tasks.is_empty()
            && self
                .tasks
                .values()
                .all(|r| matches!(r.status(), TaskStatus::Complete | TaskStatus::Skipped))
    }

    /// Tasks stuck in `in_progress` longer than the timeout.
    pub fn stale_in_progress(&self, timeout_seconds: u64, now_ms: u64) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|(_, r)| r.is_in_progress())
            .filter(|(_, r)| {
                r.started_at_ms
                    .map(|started| now_ms.saturating_sub(started) > timeout_seconds * 1000)
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("feature", &self.feature)
            .field("state_path", &self.state_path)
            .finish()
    }
}

/// Crash-safe store for one feature's state.
pub struct StateStore {
    feature: String,
    state_path: PathBuf,
    mutation_lock: Lockfile,
    events: EventLog,
    state: FeatureState,
    clock: Arc<dyn Clock>,
}

impl StateStore {
    /// Open the store rooted at `repo_root/.zerg/state`. Loads an existing
    /// snapshot; a corrupt snapshot is a hard error, never overwritten.
    pub fn open(
        repo_root: &Path,
        feature: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        Self::open_at(&repo_root.join(".zerg/state"), feature, clock)
    }

    /// Open the store at an explicit state directory (workers receive the
    /// directory via `ZERG_STATE_DIR` because they run inside worktrees).
    pub fn open_at(
        state_dir: &Path,
        feature: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        validate_feature_name(feature)?;
        let state_dir = state_dir.to_path_buf();
        let state_path = state_dir.join(format!("{feature}.json"));
        let lock_path = state_dir.join(format!("{feature}.json.lock"));
        let events = EventLog::open(state_dir.join("events.jsonl"))?;

        let mut store = Self {
            feature: feature.to_string(),
            state_path,
            mutation_lock: Lockfile::new(lock_path, Arc::clone(&clock)),
            events,
            state: FeatureState {
                feature: feature.to_string(),
                ..FeatureState::default()
            },
            clock,
        };
        store.load()?;
        Ok(store)
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn state(&self) -> &FeatureState {
        &self.state
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Re-read the snapshot from disk. A missing file leaves a fresh state;
    /// a corrupt file fails loudly.
    pub fn load(&mut self) -> Result<(), StoreError> {
        if !self.state_path.exists() {
            return Ok(());
        }
        let text = std::fs::read_to_string(&self.state_path).map_err(|source| StoreError::Io {
            path: self.state_path.display().to_string(),
            source,
        })?;
        self.state =
            serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
                path: self.state_path.display().to_string(),
                source,
            })?;
        Ok(())
    }

    /// Write the snapshot atomically: sibling tmp file, fsync, rename.
    pub fn save(&self) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.state_path.display().to_string(),
            source,
        };
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp_path = self.state_path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.state)?;
        {
            let mut file = std::fs::File::create(&tmp_path).map_err(io_err)?;
            use std::io::Write;
            file.write_all(json.as_bytes()).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        std::fs::rename(&tmp_path, &self.state_path).map_err(io_err)
    }

    /// Durably append an event outside a mutation (trace-only callers).
    pub fn append_event(&mut self, event: Event) -> Result<u64, StoreError> {
        let now = self.clock.now_ms();
        Ok(self.events.append(&event, now)?)
    }

    /// Run one mutation transaction: lock, reload, mutate, save, append
    /// events, unlock (on every exit path).
    pub fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut FeatureState, &mut Vec<Event>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.mutation_lock.acquire_blocking(MUTATION_LOCK_TIMEOUT)?;
        let result = self.transact_locked(f);
        self.mutation_lock.release();
        result
    }

    fn transact_locked<T>(
        &mut self,
        f: impl FnOnce(&mut FeatureState, &mut Vec<Event>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.load()?;
        let mut events = Vec::new();
        let value = f(&mut self.state, &mut events)?;
        self.save()?;
        let now = self.clock.now_ms();
        for event in &events {
            self.events.append(event, now)?;
        }
        Ok(value)
    }

    /// Bind the store to a task graph: records the graph hash and creates
    /// missing task/level records. Refuses a snapshot recorded under a
    /// different graph hash.
    pub fn ensure_graph(&mut self, graph_hash: &str, tasks: &[Task]) -> Result<(), StoreError> {
        let hash = graph_hash.to_string();
        let tasks = tasks.to_vec();
        self.transact(move |state, _events| {
            if let Some(stored) = &state.graph_hash {
                if *stored != hash {
                    return Err(StoreError::GraphMismatch {
                        stored: stored.clone(),
                        graph: hash,
                    });
                }
            } else {
                state.graph_hash = Some(hash);
            }

            for task in &tasks {
                state
                    .tasks
                    .entry(task.id.clone())
                    .or_insert_with(|| TaskRecord {
                        level: task.level,
                        status: Some(TaskStatus::Pending),
                        ..TaskRecord::default()
                    });
                let level = state
                    .levels
                    .entry(task.level)
                    .or_insert_with(|| LevelRecord::new(task.level, 0));
                level.total_tasks = tasks.iter().filter(|t| t.level == task.level).count() as u32;
            }
            Ok(())
        })
    }

    /// Atomically claim a task for a worker.
    ///
    /// Rejects claims for tasks outside the current level, with incomplete
    /// dependencies, or already claimed by another worker. A repeated claim
    /// by the same worker on its own still-running task returns `true`
    /// without mutation.
    pub fn claim_task(
        &mut self,
        task_id: &TaskId,
        worker_id: u32,
        current_level: u32,
        checker: &dyn DependencyChecker,
    ) -> Result<bool, StoreError> {
        let task_id = task_id.clone();
        let deps = checker.dependencies_of(&task_id);
        let now = self.clock.now_ms();
        self.transact(move |state, events| {
            let Some(record) = state.tasks.get(&task_id) else {
                return Err(StoreError::TaskNotFound(task_id.clone()));
            };

            // Idempotent re-claim by the same worker
            if record.is_in_progress() && record.worker_id == Some(worker_id) {
                return Ok(true);
            }
            // A paused run accepts no new claims until resumed
            if state.paused {
                return Ok(false);
            }
            if !record.is_pending() {
                return Ok(false);
            }
            if record.level != current_level {
                return Ok(false);
            }
            let deps_complete = deps.iter().all(|dep| {
                state
                    .tasks
                    .get(dep)
                    .map(|r| r.status() == TaskStatus::Complete)
                    .unwrap_or(false)
            });
            if !deps_complete {
                return Ok(false);
            }

            if let Some(record) = state.tasks.get_mut(&task_id) {
                record.status = Some(TaskStatus::InProgress);
                record.worker_id = Some(worker_id);
                record.started_at_ms = Some(now);
                record.retry_ready_at_ms = None;
            }
            if let Some(worker) = state.workers.get_mut(&worker_id) {
                worker.current_task = Some(task_id.clone());
            }
            events.push(Event::TaskClaimed {
                task_id: task_id.clone(),
                worker_id,
            });
            Ok(true)
        })
    }

    /// Transition a task's status, maintaining level counters, timestamps,
    /// and the retry count (which `worker_crash` failures never bump).
    pub fn set_task_status(
        &mut self,
        task_id: &TaskId,
        status: TaskStatus,
        worker_id: Option<u32>,
        error: Option<String>,
        kind: Option<FailureKind>,
    ) -> Result<(), StoreError> {
        let task_id = task_id.clone();
        let now = self.clock.now_ms();
        self.transact(move |state, events| {
            let Some(record) = state.tasks.get_mut(&task_id) else {
                return Err(StoreError::TaskNotFound(task_id.clone()));
            };
            let previous = record.status();
            if previous == status {
                return Ok(());
            }

            record.status = Some(status);
            if let Some(worker_id) = worker_id {
                record.worker_id = Some(worker_id);
            }
            match status {
                TaskStatus::InProgress => {
                    record.started_at_ms = Some(now);
                }
                TaskStatus::Complete => {
                    record.completed_at_ms = Some(now);
                    if record.duration_ms.is_none() {
                        if let Some(started) = record.started_at_ms {
                            record.duration_ms = Some(now.saturating_sub(started));
                        }
                    }
                    record.last_error = None;
                    record.failure_kind = None;
                    record.retry_ready_at_ms = None;
                }
                TaskStatus::Failed => {
                    record.last_error = error.clone();
                    record.failure_kind = kind;
                    if kind != Some(FailureKind::WorkerCrash) {
                        record.retry_count += 1;
                    }
                }
                TaskStatus::Pending => {
                    record.worker_id = None;
                    record.started_at_ms = None;
                    record.completed_at_ms = None;
                    record.retry_ready_at_ms = None;
                }
                TaskStatus::Paused | TaskStatus::Skipped => {}
            }
            let record_level = record.level;
            let record_worker = record.worker_id;

            // Level counters follow status transitions
            if let Some(level) = state.levels.get_mut(&record_level) {
                match previous {
                    TaskStatus::Complete => level.completed_tasks = level.completed_tasks.saturating_sub(1),
                    TaskStatus::Failed => level.failed_tasks = level.failed_tasks.saturating_sub(1),
                    _ => {}
                }
                match status {
                    TaskStatus::Complete => level.completed_tasks += 1,
                    TaskStatus::Failed => level.failed_tasks += 1,
                    _ => {}
                }
            }

            // Clear the worker's current_task pointer when the task leaves
            // in_progress
            if previous == TaskStatus::InProgress && status != TaskStatus::InProgress {
                for worker in state.workers.values_mut() {
                    if worker.current_task.as_ref() == Some(&task_id) {
                        worker.current_task = None;
                    }
                }
            }

            match status {
                TaskStatus::Complete => events.push(Event::TaskComplete {
                    task_id: task_id.clone(),
                    worker_id: record_worker.unwrap_or(0),
                }),
                TaskStatus::Failed => events.push(Event::TaskFailed {
                    task_id: task_id.clone(),
                    worker_id: record_worker.unwrap_or(0),
                    error: error.clone().unwrap_or_default(),
                }),
                _ => {}
            }
            Ok(())
        })
    }

    /// Schedule a retry by stamping `retry_ready_at_ms` on a failed task.
    pub fn schedule_retry(
        &mut self,
        task_id: &TaskId,
        ready_at_ms: u64,
        kind: FailureKind,
    ) -> Result<(), StoreError> {
        let task_id = task_id.clone();
        self.transact(move |state, events| {
            let Some(record) = state.tasks.get_mut(&task_id) else {
                return Err(StoreError::TaskNotFound(task_id.clone()));
            };
            record.retry_ready_at_ms = Some(ready_at_ms);
            record.failure_kind = Some(kind);
            events.push(Event::TaskRetryScheduled {
                task_id: task_id.clone(),
                retry_count: record.retry_count,
                kind,
                ready_at_ms,
            });
            Ok(())
        })
    }

    /// Reset failed tasks whose retry timestamps have passed back to
    /// pending. Returns the task ids that became eligible.
    pub fn take_due_retries(&mut self, now_ms: u64) -> Result<Vec<TaskId>, StoreError> {
        self.transact(move |state, _events| {
            let due: Vec<TaskId> = state
                .tasks
                .iter()
                .filter(|(_, r)| r.status() == TaskStatus::Failed)
                .filter(|(_, r)| r.retry_ready_at_ms.map(|t| t <= now_ms).unwrap_or(false))
                .map(|(id, _)| id.clone())
                .collect();
            for id in &due {
                if let Some(record) = state.tasks.get_mut(id) {
                    let level = record.level;
                    record.status = Some(TaskStatus::Pending);
                    record.worker_id = None;
                    record.started_at_ms = None;
                    record.retry_ready_at_ms = None;
                    if let Some(level) = state.levels.get_mut(&level) {
                        level.failed_tasks = level.failed_tasks.saturating_sub(1);
                    }
                }
            }
            Ok(due)
        })
    }

    /// Reset a task to pending without touching its retry count (crash
    /// reassignment path).
    pub fn reset_task_to_pending(&mut self, task_id: &TaskId) -> Result<(), StoreError> {
        let task_id = task_id.clone();
        self.transact(move |state, _events| {
            let Some(record) = state.tasks.get_mut(&task_id) else {
                return Err(StoreError::TaskNotFound(task_id.clone()));
            };
            let previous = record.status();
            let level = record.level;
            record.status = Some(TaskStatus::Pending);
            record.worker_id = None;
            record.started_at_ms = None;
            record.retry_ready_at_ms = None;
            if let Some(level) = state.levels.get_mut(&level) {
                match previous {
                    TaskStatus::Complete => {
                        level.completed_tasks = level.completed_tasks.saturating_sub(1)
                    }
                    TaskStatus::Failed => level.failed_tasks = level.failed_tasks.saturating_sub(1),
                    _ => {}
                }
            }
            for worker in state.workers.values_mut() {
                if worker.current_task.as_ref() == Some(&task_id) {
                    worker.current_task = None;
                }
            }
            Ok(())
        })
    }

    /// Upsert a worker record.
    pub fn set_worker_state(&mut self, record: WorkerRecord) -> Result<(), StoreError> {
        self.transact(move |state, _events| {
            state.workers.insert(record.worker_id, record);
            Ok(())
        })
    }

    /// Mark a worker ready. Idempotent: `ready_at` is set and the
    /// `worker:ready` event emitted only on the first call per spawn.
    pub fn set_worker_ready(&mut self, worker_id: u32) -> Result<(), StoreError> {
        let now = self.clock.now_ms();
        self.transact(move |state, events| {
            if let Some(worker) = state.workers.get_mut(&worker_id) {
                worker.status = WorkerStatus::Ready;
                if worker.ready_at_ms.is_none() {
                    worker.ready_at_ms = Some(now);
                    events.push(Event::WorkerReady {
                        worker_id,
                        worktree: worker.worktree_path.clone(),
                        branch: worker.branch.clone(),
                    });
                }
            }
            Ok(())
        })
    }

    pub fn set_current_level(&mut self, level: u32) -> Result<(), StoreError> {
        self.transact(move |state, _events| {
            state.current_level = level;
            Ok(())
        })
    }

    pub fn set_level_status(
        &mut self,
        level: u32,
        status: LevelStatus,
        merge_commit: Option<String>,
    ) -> Result<(), StoreError> {
        self.transact(move |state, _events| {
            let record = state
                .levels
                .entry(level)
                .or_insert_with(|| LevelRecord::new(level, 0));
            record.status = status;
            if merge_commit.is_some() {
                record.merge_commit = merge_commit;
            }
            Ok(())
        })
    }

    pub fn set_level_merge_status(
        &mut self,
        level: u32,
        merge_status: MergeStatus,
    ) -> Result<(), StoreError> {
        self.transact(move |state, _events| {
            let record = state
                .levels
                .entry(level)
                .or_insert_with(|| LevelRecord::new(level, 0));
            record.merge_status = merge_status;
            Ok(())
        })
    }

    pub fn record_task_duration(
        &mut self,
        task_id: &TaskId,
        duration_ms: u64,
    ) -> Result<(), StoreError> {
        let task_id = task_id.clone();
        self.transact(move |state, _events| {
            let Some(record) = state.tasks.get_mut(&task_id) else {
                return Err(StoreError::TaskNotFound(task_id.clone()));
            };
            record.duration_ms = Some(duration_ms);
            Ok(())
        })
    }

    pub fn store_metrics(&mut self, metrics: FeatureMetrics) -> Result<(), StoreError> {
        self.transact(move |state, _events| {
            state.metrics = Some(metrics);
            Ok(())
        })
    }

    pub fn set_error(&mut self, error: Option<String>) -> Result<(), StoreError> {
        self.transact(move |state, _events| {
            state.error = error;
            Ok(())
        })
    }

    pub fn set_paused(&mut self, paused: bool) -> Result<(), StoreError> {
        self.transact(move |state, _events| {
            state.paused = paused;
            Ok(())
        })
    }

    /// Write the human-readable `STATE.md` projection (non-authoritative).
    pub fn generate_state_md(&self) -> Result<(), StoreError> {
        let text = crate::state_md::render(&self.state);
        let path = self
            .state_path
            .parent()
            .map(|p| p.join("STATE.md"))
            .unwrap_or_else(|| PathBuf::from("STATE.md"));
        std::fs::write(&path, text).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }

}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
