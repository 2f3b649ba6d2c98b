// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Level lifecycle: start, merge on resolution, rebase, pause paths.

use crate::emitter::EventBus;
use crate::gates::GatePipeline;
use crate::merge::{MergeCoordinator, MergeFlowResult};
use std::time::Duration;
use tracing::{error, info, warn};
use zerg_adapters::WorktreeManager;
use zerg_core::{Event, LevelStatus, MergeConfig, MergeStatus, QualityGate};
use zerg_graph::TaskGraph;
use zerg_storage::{FeatureMetrics, StateStore};

use crate::error::EngineError;

/// Coordinates one level at a time.
pub struct LevelCoordinator {
    feature: String,
    merge_config: MergeConfig,
    gates: Vec<QualityGate>,
    skip_tests: bool,
    /// Gates deferred to ship time entirely.
    gates_at_ship_only: bool,
    defer_merge_to_ship: bool,
    pub last_merge_result: Option<MergeFlowResult>,
}

impl LevelCoordinator {
    pub fn new(
        feature: String,
        merge_config: MergeConfig,
        gates: Vec<QualityGate>,
        skip_tests: bool,
        gates_at_ship_only: bool,
        defer_merge_to_ship: bool,
    ) -> Self {
        Self {
            feature,
            merge_config,
            gates,
            skip_tests,
            gates_at_ship_only,
            defer_merge_to_ship,
            last_merge_result: None,
        }
    }

    /// Start a level: status, backpressure registration, event.
    pub fn start_level(
        &self,
        store: &mut StateStore,
        graph: &TaskGraph,
        bus: &EventBus,
        level: u32,
    ) -> Result<u32, EngineError> {
        let task_count = graph.tasks_for_level(level).len() as u32;
        info!(feature = %self.feature, level, tasks = task_count, "starting level");

        store.set_current_level(level)?;
        store.set_level_status(level, LevelStatus::Running, None)?;
        let event = Event::LevelStarted {
            level,
            tasks: task_count,
        };
        store.append_event(event.clone())?;
        bus.publish(event);
        Ok(task_count)
    }

    /// Handle a resolved level: run the merge with timeout + retry
    /// backoff, then rebase workers. Returns whether advancement may
    /// proceed.
    #[allow(clippy::too_many_arguments)]
    pub async fn handle_level_complete(
        &mut self,
        store: &mut StateStore,
        merger: &MergeCoordinator,
        gate_pipeline: &GatePipeline,
        worktrees: &WorktreeManager,
        bus: &EventBus,
        level: u32,
    ) -> Result<bool, EngineError> {
        info!(level, "level resolved");

        if self.defer_merge_to_ship {
            info!(level, "merge deferred to ship time");
            store.set_level_status(level, LevelStatus::Complete, None)?;
            store.set_level_merge_status(level, MergeStatus::Pending)?;
            let event = Event::LevelComplete {
                level,
                merge_commit: None,
            };
            store.append_event(event.clone())?;
            bus.publish(event);
            return Ok(true);
        }

        store.set_level_merge_status(level, MergeStatus::Merging)?;
        store.append_event(Event::MergeStarted { level })?;

        let branches: Vec<String> = store
            .state()
            .workers
            .values()
            .map(|w| w.branch.clone())
            .collect();
        let skip_gates = self.gates_at_ship_only;
        let timeout = Duration::from_secs(self.merge_config.timeout_seconds);

        let mut merge_result: Option<MergeFlowResult> = None;
        for attempt in 0..self.merge_config.max_retries {
            let flow = merger.full_merge_flow(
                level,
                branches.clone(),
                gate_pipeline,
                &self.gates,
                skip_gates,
                self.skip_tests,
            );
            let result = match tokio::time::timeout(timeout, flow).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(level, attempt, "merge timed out");
                    MergeFlowResult {
                        success: false,
                        level,
                        source_branches: branches.clone(),
                        target_branch: merger.target_branch().to_string(),
                        merge_commit: None,
                        error: Some(format!(
                            "merge timed out after {}s",
                            self.merge_config.timeout_seconds
                        )),
                        conflict: false,
                        gate_results: Vec::new(),
                    }
                }
            };

            if result.success || result.conflict {
                merge_result = Some(result);
                break;
            }

            // Non-conflict failure: back off 10s, 20s, 40s and retry
            let is_last = attempt + 1 >= self.merge_config.max_retries;
            if !is_last {
                let backoff = 10u64 << attempt;
                warn!(
                    level,
                    attempt = attempt + 1,
                    backoff_seconds = backoff,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "merge attempt failed; retrying",
                );
                store.append_event(Event::MergeRetry {
                    level,
                    attempt: attempt + 1,
                    backoff_seconds: backoff,
                    error: result.error.clone().unwrap_or_default(),
                })?;
                merge_result = Some(result);
                tokio::time::sleep(Duration::from_secs(backoff)).await;
            } else {
                merge_result = Some(result);
            }
        }

        let result = match merge_result {
            Some(result) => result,
            None => return Ok(false),
        };
        self.last_merge_result = Some(result.clone());

        if result.success {
            store.set_level_status(level, LevelStatus::Complete, result.merge_commit.clone())?;
            store.set_level_merge_status(level, MergeStatus::Complete)?;
            let event = Event::LevelComplete {
                level,
                merge_commit: result.merge_commit.clone(),
            };
            store.append_event(event.clone())?;
            bus.publish(event);
            if let Some(commit) = &result.merge_commit {
                let event = Event::MergeComplete {
                    level,
                    merge_commit: commit.clone(),
                };
                store.append_event(event.clone())?;
                bus.publish(event);
            }

            let metrics = FeatureMetrics::compute(store.state());
            store.store_metrics(metrics)?;

            self.rebase_all_workers(store, worktrees, level).await?;

            if let Err(err) = store.generate_state_md() {
                warn!(error = %err, "failed to generate STATE.md");
            }
            return Ok(true);
        }

        // Failure paths
        let error_text = result
            .error
            .clone()
            .unwrap_or_else(|| "unknown merge error".into());
        if result.conflict {
            error!(level, error = %error_text, "merge conflict; intervention required");
            store.set_level_merge_status(level, MergeStatus::Conflict)?;
            self.pause_for_intervention(
                store,
                bus,
                &format!("merge conflict in level {level}: {error_text}"),
            )?;
        } else {
            error!(
                level,
                retries = self.merge_config.max_retries,
                error = %error_text,
                "merge failed after retries",
            );
            store.set_level_merge_status(level, MergeStatus::Failed)?;
            self.set_recoverable_error(
                store,
                bus,
                &format!(
                    "level {level} merge failed after {} attempts: {error_text}",
                    self.merge_config.max_retries
                ),
            )?;
        }
        Ok(false)
    }

    /// Rebase every live worker branch onto the freshly merged mainline.
    async fn rebase_all_workers(
        &self,
        store: &mut StateStore,
        worktrees: &WorktreeManager,
        level: u32,
    ) -> Result<(), EngineError> {
        info!(level, "rebasing worker branches onto merged mainline");
        store.set_level_merge_status(level, MergeStatus::Rebasing)?;

        let live: Vec<(u32, std::path::PathBuf)> = store
            .state()
            .workers
            .values()
            .filter(|w| w.status.is_active())
            .map(|w| (w.worker_id, w.worktree_path.clone()))
            .collect();
        for (worker_id, worktree) in live {
            if !worktree.exists() {
                continue;
            }
            match worktrees.rebase(&worktree, &self.merge_config.target_branch).await {
                Ok(true) => info!(worker_id, "worker branch rebased"),
                Ok(false) => warn!(worker_id, "worker rebase conflicted; branch left as-is"),
                Err(err) => warn!(worker_id, error = %err, "worker rebase failed"),
            }
        }

        store.set_level_merge_status(level, MergeStatus::Complete)?;
        Ok(())
    }

    /// Pause for manual intervention (merge conflicts).
    pub fn pause_for_intervention(
        &self,
        store: &mut StateStore,
        bus: &EventBus,
        reason: &str,
    ) -> Result<(), EngineError> {
        warn!(reason, "pausing for intervention");
        store.set_paused(true)?;
        store.set_error(Some(reason.to_string()))?;
        let event = Event::RushPaused {
            reason: reason.to_string(),
        };
        store.append_event(event.clone())?;
        bus.publish(event);
        info!("intervention required: resolve, then `zerg retry` / `zerg rush --resume`");
        Ok(())
    }

    /// Recoverable error: pause the run but leave it resumable.
    pub fn set_recoverable_error(
        &self,
        store: &mut StateStore,
        bus: &EventBus,
        error: &str,
    ) -> Result<(), EngineError> {
        warn!(error, "recoverable error; pausing");
        store.set_error(Some(error.to_string()))?;
        store.set_paused(true)?;
        let event = Event::RecoverableError {
            error: error.to_string(),
        };
        store.append_event(event.clone())?;
        bus.publish(event);
        Ok(())
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
