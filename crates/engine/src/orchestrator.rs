// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The main orchestration engine.
//!
//! One cooperative control loop per feature: poll workers, sweep retries
//! and stale tasks, advance levels through the merge protocol, and
//! recover from partial failure. State on disk is the ground truth; live
//! worker processes are disposable.

use crate::backpressure::{BackpressureController, LevelPressureStatus};
use crate::breaker::{BreakerState, CircuitBreaker};
use crate::coordinator::LevelCoordinator;
use crate::emitter::EventBus;
use crate::error::EngineError;
use crate::gates::GatePipeline;
use crate::levels::LevelProgress;
use crate::loops::LoopController;
use crate::merge::MergeCoordinator;
use crate::retry::RetryManager;
use crate::worker_mgr::WorkerManager;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use zerg_adapters::{
    detect_launcher_mode, ContainerLauncher, Launcher, LauncherConfig, LauncherError, LauncherMode,
    PortAllocator, SubprocessLauncher, WorktreeManager,
};
use zerg_core::{
    Clock, Event, FailureKind, LevelRecord, MergeStatus, ResolvedCapabilities, TaskId, TaskStatus,
    VerificationLevel, WorkerStatus, ZergConfig,
};
use zerg_graph::{TaskGraph, WorkerAssignment};
use zerg_storage::{EscalationMonitor, FeatureMetrics, StateStore};

/// How the orchestrator is launched.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub repo_root: PathBuf,
    pub feature: String,
    pub task_graph_path: PathBuf,
    pub worker_count: u32,
    pub start_level: Option<u32>,
    pub dry_run: bool,
    pub resume: bool,
    pub mode: LauncherMode,
    pub skip_tests: bool,
    pub capabilities: ResolvedCapabilities,
}

/// Status snapshot rendered by `zerg status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub feature: String,
    pub running: bool,
    pub paused: bool,
    pub current_level: u32,
    pub is_complete: bool,
    pub metrics: FeatureMetrics,
    pub levels: BTreeMap<u32, LevelRecord>,
    pub workers: BTreeMap<u32, WorkerSummary>,
    pub circuit_breaker: HashMap<String, BreakerState>,
    pub backpressure: HashMap<u32, LevelPressureStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    pub status: WorkerStatus,
    pub current_task: Option<TaskId>,
    pub tasks_completed: u32,
}

/// Main ZERG orchestration engine.
pub struct Orchestrator {
    options: OrchestratorOptions,
    config: ZergConfig,
    store: StateStore,
    graph: TaskGraph,
    assignment: WorkerAssignment,
    worker_mgr: WorkerManager,
    coordinator: LevelCoordinator,
    merger: MergeCoordinator,
    gate_pipeline: GatePipeline,
    retry: RetryManager,
    breaker: CircuitBreaker,
    backpressure: BackpressureController,
    escalations: EscalationMonitor,
    bus: EventBus,
    loops: Option<LoopController>,
    launcher: Arc<dyn Launcher>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    running: bool,
    /// Levels whose completion has already been handled this run.
    handled_levels: std::collections::HashSet<u32>,
    restart_counts: HashMap<u32, u32>,
    respawn_counts: HashMap<u32, u32>,
    /// Event log cursor for outcome-driven accounting.
    last_event_seq: u64,
}

impl Orchestrator {
    /// Wire everything. Fails fast on invalid graph, config, or an
    /// explicitly requested container backend without docker.
    pub async fn new(options: OrchestratorOptions) -> Result<Self, EngineError> {
        let config = ZergConfig::load(&options.repo_root)?;
        let clock: Arc<dyn Clock> = Arc::new(zerg_core::SystemClock);
        let graph = TaskGraph::load(&options.task_graph_path)?;
        let store = StateStore::open(&options.repo_root, &options.feature, Arc::clone(&clock))?;

        let launcher = Self::build_launcher(&options, &config).await?;
        let worktrees = WorktreeManager::new(&options.repo_root, &config.merge.target_branch);
        let ports = PortAllocator::new(config.ports.range_start, config.ports.range_end);

        let worker_mgr = WorkerManager::new(
            options.feature.clone(),
            options.repo_root.clone(),
            config.clone(),
            options.capabilities.clone(),
            Arc::clone(&launcher),
            worktrees,
            ports,
            Arc::clone(&clock),
        );
        let coordinator = LevelCoordinator::new(
            options.feature.clone(),
            config.merge.clone(),
            config.quality_gates.clone(),
            options.skip_tests,
            config.rush.gates_at_ship_only,
            config.rush.defer_merge_to_ship,
        );
        let merger = MergeCoordinator::new(&options.repo_root, &config.merge.target_branch);
        let gate_pipeline = GatePipeline::new(
            options.repo_root.join(&config.verification.artifact_dir),
            options.capabilities.staleness_threshold_seconds,
            config.verification.stop_on_required_failure,
            Arc::clone(&clock),
        );
        let retry = RetryManager::new(&config.workers, Arc::clone(&clock));
        let breaker = CircuitBreaker::new(&config.error_recovery.circuit_breaker, Arc::clone(&clock));
        let backpressure = BackpressureController::new(&config.error_recovery.backpressure);
        let escalations = EscalationMonitor::new(&options.repo_root.join(".zerg/state"));
        let loops = if options.capabilities.loop_enabled {
            Some(LoopController::new(
                &config.improvement_loops,
                options.capabilities.loop_iterations,
            ))
        } else {
            None
        };

        let assignment = WorkerAssignment::new(options.worker_count);

        Ok(Self {
            config,
            store,
            graph,
            assignment,
            worker_mgr,
            coordinator,
            merger,
            gate_pipeline,
            retry,
            breaker,
            backpressure,
            escalations,
            bus: EventBus::default(),
            loops,
            launcher,
            clock,
            poll_interval: Duration::from_secs(15),
            running: false,
            handled_levels: Default::default(),
            restart_counts: HashMap::new(),
            respawn_counts: HashMap::new(),
            last_event_seq: 0,
            options,
        })
    }

    async fn build_launcher(
        options: &OrchestratorOptions,
        config: &ZergConfig,
    ) -> Result<Arc<dyn Launcher>, EngineError> {
        let worker_program = std::env::current_exe()
            .unwrap_or_else(|_| PathBuf::from("zerg"));
        let launcher_config = LauncherConfig {
            worker_program,
            worker_args: vec!["worker".into()],
            log_dir: options.repo_root.join(&config.logging.directory),
            stall_timeout: Duration::from_secs(config.heartbeat.stall_timeout_seconds),
            stall_cooldown: Duration::from_secs(config.heartbeat.stall_cooldown_seconds),
        };

        let explicit_container = options.mode == LauncherMode::Container;
        let resolved = detect_launcher_mode(options.mode).await;

        match resolved {
            LauncherMode::Subprocess | LauncherMode::Auto => {
                info!("using subprocess launcher");
                Ok(Arc::new(SubprocessLauncher::new(launcher_config)))
            }
            LauncherMode::Container => {
                let launcher = ContainerLauncher::new(
                    launcher_config,
                    config.resources.container_image.clone(),
                    config.resources.container_memory_limit.clone(),
                    config.resources.container_cpu_limit,
                    options.repo_root.clone(),
                );
                if !launcher.ensure_network().await {
                    if explicit_container {
                        return Err(LauncherError::DockerUnavailable(
                            "network creation failed".into(),
                        )
                        .into());
                    }
                    warn!("docker network setup failed; falling back to subprocess");
                    let launcher_config = LauncherConfig {
                        worker_program: std::env::current_exe()
                            .unwrap_or_else(|_| PathBuf::from("zerg")),
                        worker_args: vec!["worker".into()],
                        log_dir: options.repo_root.join(&config.logging.directory),
                        stall_timeout: Duration::from_secs(config.heartbeat.stall_timeout_seconds),
                        stall_cooldown: Duration::from_secs(
                            config.heartbeat.stall_cooldown_seconds,
                        ),
                    };
                    return Ok(Arc::new(SubprocessLauncher::new(launcher_config)));
                }
                launcher.cleanup_orphans(&options.feature).await;
                info!("using container launcher");
                Ok(Arc::new(launcher))
            }
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Human-readable execution plan for `--dry-run`.
    pub fn plan(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== ZERG Execution Plan ===");
        let _ = writeln!(out);
        let _ = writeln!(out, "Feature: {}", self.options.feature);
        let _ = writeln!(out, "Total tasks: {}", self.graph.total_tasks());
        let _ = writeln!(out, "Levels: {:?}", self.graph.levels());
        let _ = writeln!(out, "Workers: {}", self.options.worker_count);
        let _ = writeln!(out);
        for level in self.graph.levels() {
            let _ = writeln!(out, "Level {level}:");
            for task in self.graph.tasks_for_level(level) {
                let worker = self
                    .assignment
                    .get_task_worker(&task.id)
                    .map(|w| w.to_string())
                    .unwrap_or_else(|| "?".into());
                let _ = writeln!(out, "  [{}] {} -> Worker {worker}", task.id, task.title);
            }
            let _ = writeln!(out);
        }
        out
    }

    /// Start orchestration and run to completion (or pause).
    pub async fn start(&mut self) -> Result<(), EngineError> {
        info!(feature = %self.options.feature, "starting orchestration");

        self.store
            .ensure_graph(&self.graph.graph_hash(), &self.graph.all_tasks().cloned().collect::<Vec<_>>())?;
        self.assignment.assign(&self.graph)?;
        let assignments_path = self
            .options
            .repo_root
            .join(".gsd/specs")
            .join(&self.options.feature)
            .join("worker-assignments.json");
        self.assignment
            .save_to_file(&assignments_path, &self.options.feature)?;

        if self.options.resume {
            info!("resuming paused run");
            self.store.set_paused(false)?;
            self.store.set_error(None)?;
            self.store.append_event(Event::RushResumed)?;
        }

        self.store.append_event(Event::RushStarted {
            workers: self.options.worker_count,
            total_tasks: self.graph.total_tasks() as u32,
        })?;
        self.bus.publish(Event::RushStarted {
            workers: self.options.worker_count,
            total_tasks: self.graph.total_tasks() as u32,
        });
        self.last_event_seq = self.store.events().last_seq();

        if self.options.dry_run {
            info!("dry run; not spawning workers");
            return Ok(());
        }

        self.running = true;
        self.worker_mgr.set_running(true);
        let spawned = self
            .worker_mgr
            .spawn_workers(&mut self.store, self.options.worker_count)
            .await?;
        if spawned == 0 {
            let reason = "no workers spawned".to_string();
            self.store.append_event(Event::RushFailed {
                reason: reason.clone(),
            })?;
            return Err(EngineError::NoWorkersSpawned {
                requested: self.options.worker_count,
                mode: self.launcher.mode().to_string(),
            });
        }
        if spawned < self.options.worker_count {
            warn!(
                spawned,
                requested = self.options.worker_count,
                "continuing with reduced capacity",
            );
        }
        self.worker_mgr
            .wait_for_initialization(&mut self.store, Duration::from_secs(600))
            .await?;

        let effective_start = self
            .options
            .start_level
            .unwrap_or_else(|| self.graph.levels().first().copied().unwrap_or(1));
        self.premark_levels_before(effective_start)?;
        self.coordinator
            .start_level(&mut self.store, &self.graph, &self.bus, effective_start)?;
        self.backpressure.register_level(
            effective_start,
            self.graph.tasks_for_level(effective_start).len() as u32,
        );

        let result = self.main_loop().await;
        let stop_force = result.is_err();
        if let Err(err) = self.stop(stop_force).await {
            warn!(error = %err, "shutdown cleanup failed");
        }
        result
    }

    /// Mark every level before `start` complete (resuming mid-feature).
    fn premark_levels_before(&mut self, start: u32) -> Result<(), EngineError> {
        for level in self.graph.levels() {
            if level >= start {
                break;
            }
            info!(level, "pre-marking level complete (starting later)");
            for task in self.graph.tasks_for_level(level) {
                self.store.set_task_status(
                    &task.id,
                    TaskStatus::Complete,
                    None,
                    None,
                    None,
                )?;
            }
            self.store
                .set_level_status(level, zerg_core::LevelStatus::Complete, None)?;
            self.store.set_level_merge_status(level, MergeStatus::Complete)?;
            self.handled_levels.insert(level);
        }
        Ok(())
    }

    /// The single poll-loop body; both entry points funnel here.
    async fn main_loop(&mut self) -> Result<(), EngineError> {
        info!("entering main loop");
        while self.running {
            self.poll_workers().await?;
            self.consume_new_events()?;
            self.sweep_retries()?;
            self.check_backpressure()?;
            self.check_level_progress().await?;
            if !self.running {
                break;
            }
            self.auto_respawn_if_drained().await?;
            tokio::time::sleep(self.poll_interval).await;
        }
        info!("main loop ended");
        Ok(())
    }

    /// Reload state, reconcile with the launcher, and handle worker
    /// lifecycle transitions.
    async fn poll_workers(&mut self) -> Result<(), EngineError> {
        self.store.load()?;
        self.worker_mgr.record_heartbeats(&self.store);
        self.launcher.sync_state().await;
        self.surface_escalations();
        self.reassign_stranded_tasks()?;

        let active: Vec<u32> = self
            .store
            .state()
            .workers
            .values()
            .filter(|w| w.status.is_active())
            .map(|w| w.worker_id)
            .collect();

        for worker_id in active {
            let status = self.launcher.monitor(worker_id).await;
            match status {
                WorkerStatus::Stalled => self.handle_stalled_worker(worker_id).await?,
                WorkerStatus::Crashed => {
                    error!(worker_id, "worker crashed");
                    let task = self
                        .store
                        .state()
                        .workers
                        .get(&worker_id)
                        .and_then(|w| w.current_task.clone());
                    self.store.append_event(Event::WorkerCrashed {
                        worker_id,
                        task_id: task.clone(),
                    })?;
                    if let Some(task_id) = task {
                        self.handle_worker_crash(&task_id, worker_id)?;
                    }
                    self.worker_mgr
                        .handle_worker_exit(&mut self.store, &self.graph, worker_id, WorkerStatus::Crashed)
                        .await?;
                    self.breaker.record_failure(&format!("worker-{worker_id}"));
                }
                WorkerStatus::Checkpointing => {
                    info!(worker_id, "worker checkpointed; recycling slot");
                    self.worker_mgr
                        .handle_worker_exit(
                            &mut self.store,
                            &self.graph,
                            worker_id,
                            WorkerStatus::Checkpointing,
                        )
                        .await?;
                }
                WorkerStatus::Stopped => {
                    self.worker_mgr
                        .handle_worker_exit(&mut self.store, &self.graph, worker_id, WorkerStatus::Stopped)
                        .await?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn handle_stalled_worker(&mut self, worker_id: u32) -> Result<(), EngineError> {
        warn!(worker_id, "worker stalled (heartbeat timeout)");
        let restarts = self.restart_counts.entry(worker_id).or_insert(0);
        *restarts += 1;
        let attempts = *restarts;

        if attempts <= self.config.heartbeat.max_restarts {
            info!(worker_id, attempts, "restarting stalled worker");
            self.launcher.terminate(worker_id, true).await;
            self.worker_mgr
                .handle_worker_exit(&mut self.store, &self.graph, worker_id, WorkerStatus::Stalled)
                .await?;
        } else {
            warn!(worker_id, "stalled worker exceeded max restarts; reassigning its task");
            let task = self
                .store
                .state()
                .workers
                .get(&worker_id)
                .and_then(|w| w.current_task.clone());
            if let Some(task_id) = task {
                self.store.set_task_status(
                    &task_id,
                    TaskStatus::Failed,
                    Some(worker_id),
                    Some("worker stalled repeatedly".into()),
                    Some(FailureKind::Transient),
                )?;
                let retry_count = self
                    .store
                    .state()
                    .tasks
                    .get(&task_id)
                    .map(|r| r.retry_count)
                    .unwrap_or(0);
                self.retry.schedule_if_allowed(
                    &mut self.store,
                    &task_id,
                    FailureKind::Transient,
                    retry_count,
                )?;
            }
            self.launcher.terminate(worker_id, true).await;
            self.worker_mgr
                .handle_worker_exit(&mut self.store, &self.graph, worker_id, WorkerStatus::Crashed)
                .await?;
        }
        Ok(())
    }

    /// Give tasks stranded on dead or vanished workers back to the pool.
    /// Crash recovery relies on this after a restart: the snapshot may
    /// show `in_progress` work owned by processes that no longer exist.
    fn reassign_stranded_tasks(&mut self) -> Result<(), EngineError> {
        let stranded: Vec<TaskId> = self
            .store
            .state()
            .tasks
            .iter()
            .filter(|(_, record)| record.is_in_progress())
            .filter(|(_, record)| {
                record
                    .worker_id
                    .map(|worker_id| {
                        self.store
                            .state()
                            .workers
                            .get(&worker_id)
                            .map(|w| w.status.is_terminal())
                            .unwrap_or(true)
                    })
                    .unwrap_or(true)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for task_id in stranded {
            warn!(task_id = %task_id, "reassigning task stranded on an inactive worker");
            self.store.reset_task_to_pending(&task_id)?;
        }
        Ok(())
    }

    /// Crash reassignment: the task goes back to pending with no
    /// retry-count increment.
    fn handle_worker_crash(&mut self, task_id: &TaskId, worker_id: u32) -> Result<(), EngineError> {
        warn!(worker_id, task_id = %task_id, "reassigning task after worker crash");
        self.store.set_task_status(
            task_id,
            TaskStatus::Failed,
            Some(worker_id),
            Some("worker crashed (infrastructure failure)".into()),
            Some(FailureKind::WorkerCrash),
        )?;
        self.store.append_event(Event::TaskCrashReassign {
            task_id: task_id.clone(),
            worker_id,
        })?;
        self.store.reset_task_to_pending(task_id)?;
        Ok(())
    }

    /// Feed task outcome events into backpressure and the breaker.
    fn consume_new_events(&mut self) -> Result<(), EngineError> {
        let records = self.store.events().entries_after(self.last_event_seq)?;
        for record in records {
            self.last_event_seq = self.last_event_seq.max(record.seq);
            match &record.event {
                Event::TaskComplete { task_id, worker_id } => {
                    let level = self.level_of(task_id);
                    self.backpressure.record_success(level);
                    self.breaker.record_success(&format!("worker-{worker_id}"));
                    self.bus.publish(record.event.clone());
                }
                Event::TaskFailed { task_id, worker_id, .. } => {
                    let level = self.level_of(task_id);
                    self.backpressure.record_failure(level);
                    self.breaker.record_failure(&format!("worker-{worker_id}"));
                    self.bus.publish(record.event.clone());
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn level_of(&self, task_id: &TaskId) -> u32 {
        self.store
            .state()
            .tasks
            .get(task_id)
            .map(|r| r.level)
            .unwrap_or_else(|| self.store.state().current_level)
    }

    /// Retry-ready sweep, new-failure classification, and the stale-task
    /// watchdog.
    fn sweep_retries(&mut self) -> Result<(), EngineError> {
        self.retry.process_new_failures(&mut self.store)?;
        let due = self.retry.check_due(&mut self.store)?;
        if !due.is_empty() {
            info!(count = due.len(), "retry-ready tasks reset to pending");
        }
        self.retry.check_stale(&mut self.store)?;
        Ok(())
    }

    /// Pause the current level when the failure window trips.
    fn check_backpressure(&mut self) -> Result<(), EngineError> {
        let level = self.store.state().current_level;
        if self.backpressure.should_pause(level) {
            let rate = self.backpressure.failure_rate(level);
            warn!(level, failure_rate = rate, "backpressure tripped; pausing level");
            self.backpressure.pause_level(level, self.clock.now_ms());
            self.store.set_paused(true)?;
            let event = Event::LevelPaused {
                level,
                failure_rate: rate,
            };
            self.store.append_event(event.clone())?;
            self.bus.publish(event);
        }
        Ok(())
    }

    /// Resume a paused run (operator action).
    pub fn resume(&mut self) -> Result<(), EngineError> {
        let level = self.store.state().current_level;
        info!(level, "resuming execution");
        self.backpressure.resume_level(level);
        self.store.set_paused(false)?;
        self.store.set_error(None)?;
        self.store.append_event(Event::LevelResumed { level })?;
        self.store.append_event(Event::RushResumed)?;
        Ok(())
    }

    async fn check_level_progress(&mut self) -> Result<(), EngineError> {
        let current = self.store.state().current_level;
        if current == 0 {
            return Ok(());
        }

        let resolved = {
            let progress = LevelProgress::new(&self.graph, self.store.state());
            progress.is_level_resolved(current)
        };
        if !resolved || self.handled_levels.contains(&current) {
            return Ok(());
        }

        // Unresolved failures park the level until retries or the operator
        // act; only a fully-complete level merges.
        let fully_complete = {
            let progress = LevelProgress::new(&self.graph, self.store.state());
            progress.is_level_fully_complete(current)
        };
        if !fully_complete {
            return Ok(());
        }

        self.handled_levels.insert(current);
        let worktrees = self.worker_mgr.worktrees().clone();
        let merge_ok = self
            .coordinator
            .handle_level_complete(
                &mut self.store,
                &self.merger,
                &self.gate_pipeline,
                &worktrees,
                &self.bus,
                current,
            )
            .await?;

        if !merge_ok {
            warn!(level = current, "merge did not complete; run is paused");
            return Ok(());
        }

        self.run_level_loop(current).await?;

        let next = {
            let progress = LevelProgress::new(&self.graph, self.store.state());
            if progress.can_advance(current) {
                progress.next_level(current)
            } else {
                None
            }
        };
        match next {
            Some(next_level) => {
                info!(next_level, "advancing to next level");
                self.coordinator
                    .start_level(&mut self.store, &self.graph, &self.bus, next_level)?;
                self.backpressure.register_level(
                    next_level,
                    self.graph.tasks_for_level(next_level).len() as u32,
                );
                self.worker_mgr
                    .respawn_workers_for_level(&mut self.store, &self.graph, next_level)
                    .await?;
            }
            None => {
                let all_done = {
                    let progress = LevelProgress::new(&self.graph, self.store.state());
                    progress.all_levels_complete()
                };
                if all_done {
                    info!("all levels complete");
                    self.running = false;
                }
            }
        }
        Ok(())
    }

    /// Optional improvement loop after a successful level merge.
    async fn run_level_loop(&mut self, level: u32) -> Result<(), EngineError> {
        let Some(loops) = self.loops.clone() else {
            return Ok(());
        };
        let verification = self.options.capabilities.mode.verification_level();
        if verification == VerificationLevel::None {
            info!(level, "skipping improvement loop (verification level none)");
            return Ok(());
        }
        let required_only = verification == VerificationLevel::Minimal;
        let gates: Vec<zerg_core::QualityGate> = if required_only {
            self.config.quality_gates.iter().filter(|g| g.required).cloned().collect()
        } else {
            self.config.quality_gates.clone()
        };
        if gates.is_empty() {
            return Ok(());
        }

        // Reuse the merge's gate results as the starting score when
        // available, avoiding a duplicate gate run
        let initial_score = match self
            .coordinator
            .last_merge_result
            .as_ref()
            .filter(|r| !r.gate_results.is_empty())
        {
            Some(result) => GatePipeline::pass_fraction(&result.gate_results),
            None => {
                let results = self
                    .gate_pipeline
                    .run_gates_for_level(
                        level,
                        &gates,
                        &self.options.repo_root,
                        self.options.skip_tests,
                    )
                    .await;
                GatePipeline::pass_fraction(&results)
            }
        };
        if initial_score >= 1.0 {
            info!(level, "level already at perfect score; skipping loop");
            return Ok(());
        }

        info!(level, initial_score, "running improvement loop");
        let pipeline = &self.gate_pipeline;
        let repo_root = self.options.repo_root.clone();
        let skip_tests = self.options.skip_tests;
        let gates_ref = &gates;
        let summary = loops
            .run(
                move |_iteration| {
                    let pipeline = pipeline;
                    let gates = gates_ref;
                    let repo_root = repo_root.clone();
                    async move {
                        let results = pipeline
                            .run_gates_for_level(level, gates, &repo_root, skip_tests)
                            .await;
                        Ok(GatePipeline::pass_fraction(&results))
                    }
                },
                initial_score,
            )
            .await;

        info!(
            level,
            status = %summary.status,
            best_score = summary.best_score,
            iterations = summary.iterations.len(),
            "improvement loop finished",
        );
        self.store.append_event(Event::LoopCompleted {
            level,
            status: summary.status.to_string(),
            best_score: summary.best_score,
            iterations: summary.iterations.len() as u32,
            improvement: summary.improvement(),
        })?;
        Ok(())
    }

    /// When no active workers remain but tasks do, respawn slots up to the
    /// per-slot cap.
    async fn auto_respawn_if_drained(&mut self) -> Result<(), EngineError> {
        if !self.config.workers.auto_respawn || self.store.state().paused {
            return Ok(());
        }
        let any_active = self
            .store
            .state()
            .workers
            .values()
            .any(|w| w.status.is_active());
        if any_active {
            return Ok(());
        }

        let current = self.store.state().current_level;
        let remaining = {
            let progress = LevelProgress::new(&self.graph, self.store.state());
            progress.pending_tasks_for_level(current)
        };
        if remaining.is_empty() {
            return Ok(());
        }

        let max_respawn = self.config.workers.max_respawn_attempts;
        let slots = self.worker_mgr.target_count().max(1);
        let want = (remaining.len() as u32).min(slots);
        let mut spawned = 0;
        for worker_id in 0..want {
            let count = self.respawn_counts.entry(worker_id).or_insert(0);
            if *count >= max_respawn {
                warn!(worker_id, max_respawn, "slot exceeded respawn budget");
                continue;
            }
            *count += 1;
            let respawn_count = *count;
            match self.worker_mgr.spawn_worker(&mut self.store, worker_id).await {
                Ok(()) => {
                    spawned += 1;
                    self.store.append_event(Event::WorkerAutoRespawn {
                        worker_id,
                        level: current,
                        respawn_count,
                        max_respawn,
                    })?;
                }
                Err(err) => error!(worker_id, error = %err, "auto-respawn failed"),
            }
        }

        if spawned == 0 {
            error!(
                remaining = remaining.len(),
                "auto-respawn exhausted with tasks remaining"
            );
            self.store.append_event(Event::RespawnExhausted {
                level: current,
                remaining_tasks: remaining.len() as u32,
                max_respawn,
            })?;
            match self.config.workers.on_respawn_exhausted {
                zerg_core::RespawnExhaustedPolicy::Park => {
                    self.coordinator.set_recoverable_error(
                        &mut self.store,
                        &self.bus,
                        "all worker slots exhausted their respawn budget",
                    )?;
                    self.running = false;
                }
                zerg_core::RespawnExhaustedPolicy::Fail => {
                    self.running = false;
                    return Err(EngineError::Fatal(
                        "all worker slots exhausted their respawn budget".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn surface_escalations(&self) {
        for escalation in self.escalations.unresolved() {
            warn!(
                worker_id = escalation.worker_id,
                task_id = %escalation.task_id,
                category = %escalation.category,
                "unresolved escalation: {}",
                escalation.message,
            );
        }
    }

    /// Stop orchestration: terminate workers, release resources, persist
    /// final state. Safe to call repeatedly.
    pub async fn stop(&mut self, force: bool) -> Result<(), EngineError> {
        info!(force, "stopping orchestration");
        self.running = false;
        self.worker_mgr.set_running(false);
        self.worker_mgr.terminate_all(&mut self.store, force).await?;

        self.store.append_event(Event::RushStopped { force })?;
        self.bus.publish(Event::RushStopped { force });
        self.store.save()?;
        if let Err(err) = self.store.generate_state_md() {
            warn!(error = %err, "failed to generate STATE.md");
        }
        info!("orchestration stopped");
        Ok(())
    }

    /// Current status snapshot.
    pub fn status(&mut self) -> Result<StatusReport, EngineError> {
        self.store.load()?;
        let state = self.store.state();
        let workers = state
            .workers
            .iter()
            .map(|(id, w)| {
                (
                    *id,
                    WorkerSummary {
                        status: w.status,
                        current_task: w.current_task.clone(),
                        tasks_completed: w.tasks_completed,
                    },
                )
            })
            .collect();
        Ok(StatusReport {
            feature: self.options.feature.clone(),
            running: self.running,
            paused: state.paused,
            current_level: state.current_level,
            is_complete: state.is_complete(),
            metrics: FeatureMetrics::compute(state),
            levels: state.levels.clone(),
            workers,
            circuit_breaker: self.breaker.status(),
            backpressure: self.backpressure.status(),
            error: state.error.clone(),
        })
    }

    /// Manual task retry (CLI `retry <task_id>`).
    pub fn retry_task(&mut self, task_id: &TaskId) -> Result<bool, EngineError> {
        Ok(self.retry.retry_task(&mut self.store, task_id)?)
    }

    /// Manual retry of all failed tasks (CLI `retry --all`).
    pub fn retry_all_failed(&mut self) -> Result<Vec<TaskId>, EngineError> {
        Ok(self.retry.retry_all_failed(&mut self.store)?)
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
