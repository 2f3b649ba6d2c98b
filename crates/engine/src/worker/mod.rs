// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-worker protocol state machine.
//!
//! A worker boots from its `ZERG_*` environment, signals ready, then
//! loops: claim → execute → report, until no claimable task remains, the
//! context budget forces a checkpoint, or an unrecoverable error ends the
//! process. Coordination happens exclusively through the state store and
//! the worker's git branch.

pub mod context;
pub mod handler;

use crate::error::EngineError;
use context::ContextTracker;
use handler::{ExecutionOutcome, TaskExecutor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use zerg_adapters::AgentInvoker;
use zerg_core::{
    Clock, Event, ExitCode, SystemClock, Task, TaskId, TaskStatus, WorkerRecord, WorkerStatus,
    ZergConfig,
};
use zerg_graph::TaskGraph;
use zerg_storage::{DependencyChecker, EscalationWriter, NoDependencies, StateStore};

/// Claim polling cap.
const CLAIM_POLL_CAP: Duration = Duration::from_secs(10);

/// Adapts the task graph to the store's claim-time dependency check.
pub struct GraphDependencies<'a>(pub &'a TaskGraph);

impl DependencyChecker for GraphDependencies<'_> {
    fn dependencies_of(&self, id: &TaskId) -> Vec<TaskId> {
        self.0.dependencies(id).to_vec()
    }
}

/// Identity and paths a worker needs, normally read from the environment
/// the launcher injected.
#[derive(Debug, Clone)]
pub struct WorkerProtocolOptions {
    pub worker_id: u32,
    pub feature: String,
    pub branch: String,
    pub worktree: PathBuf,
    pub state_dir: PathBuf,
    pub task_graph_path: Option<PathBuf>,
    pub spec_dir: Option<PathBuf>,
}

impl WorkerProtocolOptions {
    /// Read the `ZERG_*` environment the launcher set.
    pub fn from_env() -> Result<Self, EngineError> {
        let var = |key: &str| std::env::var(key).ok();
        let required = |key: &str| {
            var(key).ok_or_else(|| EngineError::Fatal(format!("missing env var {key}")))
        };

        let worker_id = required("ZERG_WORKER_ID")?
            .parse::<u32>()
            .map_err(|_| EngineError::Fatal("ZERG_WORKER_ID is not an integer".into()))?;
        let feature = required("ZERG_FEATURE")?;
        let branch = var("ZERG_BRANCH")
            .unwrap_or_else(|| format!("zerg/{feature}/worker-{worker_id}"));
        let worktree = PathBuf::from(required("ZERG_WORKTREE")?);
        let state_dir = PathBuf::from(required("ZERG_STATE_DIR")?);

        Ok(Self {
            worker_id,
            feature,
            branch,
            worktree,
            state_dir,
            task_graph_path: var("ZERG_TASK_GRAPH").map(PathBuf::from),
            spec_dir: var("ZERG_SPEC_DIR").map(PathBuf::from),
        })
    }
}

/// The worker-side state machine.
pub struct WorkerProtocol {
    options: WorkerProtocolOptions,
    config: ZergConfig,
    store: StateStore,
    graph: Option<TaskGraph>,
    executor: TaskExecutor,
    context: ContextTracker,
    escalations: EscalationWriter,
    clock: Arc<dyn Clock>,
    current_task: Option<Task>,
    tasks_completed: u32,
}

impl WorkerProtocol {
    pub fn new(
        options: WorkerProtocolOptions,
        config: ZergConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let store = StateStore::open_at(&options.state_dir, &options.feature, Arc::clone(&clock))?;

        // A corrupt graph is survivable: claims fall back to level gating
        // only and task details to stubs.
        let graph = match &options.task_graph_path {
            Some(path) => match TaskGraph::load(path) {
                Ok(graph) => Some(graph),
                Err(err) => {
                    warn!(error = %err, "worker could not load task graph");
                    None
                }
            },
            None => None,
        };

        let spec_context = options
            .spec_dir
            .as_deref()
            .map(load_spec_context)
            .unwrap_or_default();

        let invoker = AgentInvoker::new(
            config.agent.command.clone(),
            config.agent.args.clone(),
            Duration::from_secs(config.agent.timeout_minutes * 60),
        );
        let executor = TaskExecutor::new(
            options.worker_id,
            options.branch.clone(),
            options.worktree.clone(),
            invoker,
            config.verification.max_retries,
            spec_context,
        );
        // Budget: the resolved token budget scaled up to a whole session
        let token_budget = 200_000u64;
        let context = ContextTracker::new(config.context_threshold(), token_budget);
        let escalations =
            EscalationWriter::new(&options.state_dir, options.worker_id, Arc::clone(&clock));

        Ok(Self {
            options,
            config,
            store,
            graph,
            executor,
            context,
            escalations,
            clock,
            current_task: None,
            tasks_completed: 0,
        })
    }

    pub fn from_env() -> Result<Self, EngineError> {
        let options = WorkerProtocolOptions::from_env()?;
        // The worktree holds a full checkout, so repo-relative config works
        let config = ZergConfig::load(&options.worktree)?;
        Self::new(options, config, Arc::new(SystemClock))
    }

    /// Run the protocol to completion. Returns the process exit code.
    pub async fn run(&mut self) -> Result<ExitCode, EngineError> {
        info!(
            worker_id = self.options.worker_id,
            feature = %self.options.feature,
            branch = %self.options.branch,
            "worker starting",
        );
        self.store.load()?;
        self.update_own_record(WorkerStatus::Running, None)?;
        self.signal_ready()?;

        let result = self.task_loop().await;
        match result {
            Ok(exit) => {
                if exit == ExitCode::Success {
                    self.update_own_record(WorkerStatus::Stopped, None)?;
                    info!(
                        worker_id = self.options.worker_id,
                        tasks_completed = self.tasks_completed,
                        "worker finished cleanly",
                    );
                }
                Ok(exit)
            }
            Err(err) => {
                error!(worker_id = self.options.worker_id, error = %err, "worker crashed");
                let _ = self.update_own_record(WorkerStatus::Crashed, None);
                Err(err)
            }
        }
    }

    async fn task_loop(&mut self) -> Result<ExitCode, EngineError> {
        loop {
            if self.context.should_checkpoint() {
                return self.checkpoint_and_exit().await;
            }

            let Some(task) = self.claim_next_task().await? else {
                info!(worker_id = self.options.worker_id, "no more claimable tasks");
                return Ok(ExitCode::Success);
            };
            self.current_task = Some(task.clone());
            self.update_own_record(WorkerStatus::Running, Some(task.id.clone()))?;

            let (outcome, output_bytes) = self.executor.execute(&mut self.store, &task).await?;
            self.context.track_agent_output(output_bytes);
            self.context.track_task_execution();

            match outcome {
                ExecutionOutcome::Success => self.report_complete(&task)?,
                ExecutionOutcome::Failed(reason) => self.report_failed(&task, &reason)?,
            }
            self.current_task = None;
        }
    }

    /// Claim the next available task, polling with geometric backoff while
    /// the level may still produce work.
    async fn claim_next_task(&mut self) -> Result<Option<Task>, EngineError> {
        let max_wait = Duration::from_secs(self.config.workers.claim_max_wait_seconds);
        let started = std::time::Instant::now();
        let mut interval = Duration::from_secs(2);

        loop {
            self.store.load()?;
            let paused = self.store.state().paused;
            if !paused {
                let current_level = self.store.state().current_level;
                let pending = self.store.state().tasks_by_status(TaskStatus::Pending);
                for task_id in pending {
                    let claimed = match &self.graph {
                        Some(graph) => self.store.claim_task(
                            &task_id,
                            self.options.worker_id,
                            current_level,
                            &GraphDependencies(graph),
                        )?,
                        None => self.store.claim_task(
                            &task_id,
                            self.options.worker_id,
                            current_level,
                            &NoDependencies,
                        )?,
                    };
                    if claimed {
                        let task = self.load_task_details(&task_id);
                        info!(
                            worker_id = self.options.worker_id,
                            task_id = %task_id,
                            title = %task.title,
                            "claimed task",
                        );
                        return Ok(Some(task));
                    }
                }
            }

            if started.elapsed() >= max_wait {
                return Ok(None);
            }
            tokio::time::sleep(interval).await;
            interval = (interval.mul_f64(1.5)).min(CLAIM_POLL_CAP);
        }
    }

    fn load_task_details(&self, task_id: &TaskId) -> Task {
        if let Some(task) = self.graph.as_ref().and_then(|g| g.get_task(task_id)) {
            return task.clone();
        }
        warn!(task_id = %task_id, "task missing from graph; using stub");
        Task {
            id: task_id.clone(),
            title: format!("Task {task_id}"),
            description: String::new(),
            level: self.store.state().current_level,
            dependencies: vec![],
            files: Default::default(),
            verification: None,
            estimate_minutes: None,
            context: None,
        }
    }

    fn signal_ready(&mut self) -> Result<(), EngineError> {
        self.store.set_worker_ready(self.options.worker_id)?;
        Ok(())
    }

    fn report_complete(&mut self, task: &Task) -> Result<(), EngineError> {
        self.store.set_task_status(
            &task.id,
            TaskStatus::Complete,
            Some(self.options.worker_id),
            None,
            None,
        )?;
        self.tasks_completed += 1;
        self.update_own_record(WorkerStatus::Running, None)?;
        Ok(())
    }

    fn report_failed(&mut self, task: &Task, reason: &str) -> Result<(), EngineError> {
        error!(task_id = %task.id, reason, "task failed");
        self.store.set_task_status(
            &task.id,
            TaskStatus::Failed,
            Some(self.options.worker_id),
            Some(reason.to_string()),
            None,
        )?;

        // A verification that keeps failing is ambiguous from in here:
        // the command may be wrong, or the task underspecified. Surface
        // it to the operator instead of burning the whole retry budget.
        let retry_count = self
            .store
            .state()
            .tasks
            .get(&task.id)
            .map(|r| r.retry_count)
            .unwrap_or(0);
        if reason.contains("verification") && retry_count >= 2 {
            let verification_command = task
                .verification
                .as_ref()
                .map(|v| v.command.clone())
                .unwrap_or_default();
            let mut context = std::collections::HashMap::new();
            context.insert("verification_command".to_string(), verification_command);
            self.escalations.escalate(
                &task.id,
                zerg_core::EscalationCategory::VerificationUnclear,
                format!("verification failed {retry_count} times"),
                context,
            )?;
            self.store.append_event(Event::EscalationRaised {
                worker_id: self.options.worker_id,
                task_id: task.id.clone(),
                category: zerg_core::EscalationCategory::VerificationUnclear,
            })?;
        }

        self.update_own_record(WorkerStatus::Running, None)?;
        Ok(())
    }

    /// Commit WIP, pause the current task, and exit with the checkpoint
    /// code so the orchestrator respawns a fresh slot.
    async fn checkpoint_and_exit(&mut self) -> Result<ExitCode, EngineError> {
        info!(worker_id = self.options.worker_id, "context budget reached; checkpointing");
        let git = zerg_adapters::GitOps::new(&self.options.worktree);
        if git.has_changes().await? {
            let task_ref = self
                .current_task
                .as_ref()
                .map(|t| t.id.to_string())
                .unwrap_or_else(|| "no-task".into());
            git.commit(
                &format!(
                    "WIP: ZERG [{}] checkpoint during {task_ref}",
                    self.options.worker_id
                ),
                true,
            )
            .await?;
        }

        if let Some(task) = &self.current_task {
            self.store.set_task_status(
                &task.id,
                TaskStatus::Paused,
                Some(self.options.worker_id),
                None,
                None,
            )?;
        }

        self.store.append_event(Event::WorkerCheckpoint {
            worker_id: self.options.worker_id,
            tasks_completed: self.tasks_completed,
            current_task: self.current_task.as_ref().map(|t| t.id.clone()),
        })?;
        self.update_own_record(WorkerStatus::Checkpointing, None)?;
        Ok(ExitCode::Checkpoint)
    }

    /// Read-modify-write our own worker record (reloads first so
    /// orchestrator writes are not clobbered).
    fn update_own_record(
        &mut self,
        status: WorkerStatus,
        current_task: Option<TaskId>,
    ) -> Result<(), EngineError> {
        let worker_id = self.options.worker_id;
        let branch = self.options.branch.clone();
        let worktree = self.options.worktree.clone();
        let tasks_completed = self.tasks_completed;
        let context_usage = self.context.usage();
        let now = self.clock.now_ms();

        self.store.transact(move |state, _events| {
            let record = state.workers.entry(worker_id).or_insert_with(|| {
                let mut record = WorkerRecord::new(worker_id, branch, worktree);
                record.started_at_ms = Some(now);
                record
            });
            record.status = status;
            record.current_task = current_task;
            record.tasks_completed = tasks_completed;
            record.context_usage = context_usage;
            record.health_check_at_ms = Some(now);
            Ok(())
        })?;
        Ok(())
    }
}

/// Concatenate the feature's spec markdown for prompt context.
fn load_spec_context(spec_dir: &Path) -> String {
    let mut parts = Vec::new();
    let Ok(entries) = std::fs::read_dir(spec_dir) else {
        return String::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "md").unwrap_or(false))
        .collect();
    paths.sort();
    for path in paths {
        if let Ok(text) = std::fs::read_to_string(&path) {
            parts.push(text);
        }
    }
    parts.join("\n\n")
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
