// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level scenario tests: the end-to-end behaviors the engine
//! guarantees, driven against real state stores, git repositories, and
//! in-process worker protocols with a shell-script agent.

#![allow(clippy::unwrap_used)]

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use zerg_core::{
    Clock, Event, FailureKind, FakeClock, QualityGate, Task, TaskId, TaskStatus, WorkerStatus,
    ZergConfig,
};
use zerg_engine::worker::{WorkerProtocol, WorkerProtocolOptions};
use zerg_engine::{
    BackpressureController, EventBus, GatePipeline, LevelCoordinator, MergeCoordinator,
    RetryManager, WorkerManager,
};
use zerg_graph::{GraphError, TaskGraph, ViolationField};
use zerg_storage::{NoDependencies, StateStore};

async fn init_repo(dir: &Path) {
    for args in [
        vec!["init", "-b", "main"],
        vec!["config", "user.email", "spec@example.com"],
        vec!["config", "user.name", "Spec"],
    ] {
        let output = tokio::process::Command::new("git")
            .args(&args)
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        assert!(output.status.success());
    }
    std::fs::write(dir.join("README.md"), "readme\n").unwrap();
    zerg_adapters::GitOps::new(dir)
        .commit("initial", true)
        .await
        .unwrap();
}

fn write_graph(repo: &Path, value: &serde_json::Value) -> std::path::PathBuf {
    let dir = repo.join(".gsd/tasks");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("task-graph.json");
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn worker_config(agent_script: &str) -> ZergConfig {
    let mut config = ZergConfig::default();
    config.workers.claim_max_wait_seconds = 1;
    config.agent.command = "sh".into();
    config.agent.args = vec!["-c".into(), agent_script.into()];
    config.agent.timeout_minutes = 1;
    config
}

/// Run one in-process worker protocol pass over the current level.
async fn run_worker_pass(
    repo: &Path,
    graph_path: &Path,
    worktree: &Path,
    branch: &str,
    clock: &FakeClock,
    agent_script: &str,
    worker_id: u32,
) {
    let options = WorkerProtocolOptions {
        worker_id,
        feature: "demo".into(),
        branch: branch.to_string(),
        worktree: worktree.to_path_buf(),
        state_dir: repo.join(".zerg/state"),
        task_graph_path: Some(graph_path.to_path_buf()),
        spec_dir: None,
    };
    let mut protocol =
        WorkerProtocol::new(options, worker_config(agent_script), Arc::new(clock.clone()))
            .unwrap();
    protocol.run().await.unwrap();
}

// ---------------------------------------------------------------------------
// S1: happy path, two levels, one task each, one worker
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s1_happy_path_two_levels_event_order() {
    let repo = tempfile::tempdir().unwrap();
    init_repo(repo.path()).await;
    let graph_path = write_graph(
        repo.path(),
        &json!({
            "feature": "demo",
            "tasks": [
                {"id": "T1", "title": "level one task", "level": 1,
                 "files": {"create": ["one.txt"]}},
                {"id": "T2", "title": "level two task", "level": 2,
                 "dependencies": ["T1"], "files": {"create": ["two.txt"]}},
            ],
        }),
    );
    let graph = TaskGraph::load(&graph_path).unwrap();
    let clock = FakeClock::new(1_000_000);
    let mut store = StateStore::open(repo.path(), "demo", Arc::new(clock.clone())).unwrap();
    let tasks: Vec<Task> = graph.all_tasks().cloned().collect();
    store.ensure_graph(&graph.graph_hash(), &tasks).unwrap();
    store
        .append_event(Event::RushStarted {
            workers: 1,
            total_tasks: 2,
        })
        .unwrap();

    // Spawn one (placeholder) worker process so the slot has a worktree,
    // branch, and port; the protocol work happens in-process below.
    let launcher = zerg_adapters::SubprocessLauncher::new(zerg_adapters::LauncherConfig {
        worker_program: "sh".into(),
        worker_args: vec!["-c".into(), "sleep 60".into()],
        log_dir: repo.path().join(".zerg/logs"),
        stall_timeout: Duration::from_secs(120),
        stall_cooldown: Duration::from_secs(10),
    });
    let mut manager = WorkerManager::new(
        "demo".into(),
        repo.path().to_path_buf(),
        ZergConfig::default(),
        Default::default(),
        Arc::new(launcher),
        zerg_adapters::WorktreeManager::new(repo.path(), "main"),
        zerg_adapters::PortAllocator::new(49152, 65535),
        Arc::new(clock.clone()),
    );
    manager.spawn_workers(&mut store, 1).await.unwrap();
    manager
        .wait_for_initialization(&mut store, Duration::from_secs(10))
        .await
        .unwrap();
    let worktree = store.state().workers[&0].worktree_path.clone();
    let branch = store.state().workers[&0].branch.clone();

    let bus = EventBus::default();
    let mut coordinator = LevelCoordinator::new(
        "demo".into(),
        zerg_core::MergeConfig::default(),
        vec![],
        false,
        false,
        false,
    );
    let merger = MergeCoordinator::new(repo.path(), "main");
    let pipeline = GatePipeline::new(
        repo.path().join(".zerg/artifacts"),
        300,
        true,
        Arc::new(clock.clone()),
    );
    let worktrees = zerg_adapters::WorktreeManager::new(repo.path(), "main");

    for level in [1u32, 2] {
        coordinator
            .start_level(&mut store, &graph, &bus, level)
            .unwrap();
        run_worker_pass(
            repo.path(),
            &graph_path,
            &worktree,
            &branch,
            &clock,
            "echo impl > $ZERG_TASK_ID.txt",
            0,
        )
        .await;
        store.load().unwrap();
        let advanced = coordinator
            .handle_level_complete(&mut store, &merger, &pipeline, &worktrees, &bus, level)
            .await
            .unwrap();
        assert!(advanced, "level {level} merge should succeed");
    }

    store.append_event(Event::RushStopped { force: false }).unwrap();
    manager.terminate_all(&mut store, true).await.unwrap();

    // Final status: everything complete, both task outputs on mainline
    store.load().unwrap();
    assert!(store.state().is_complete());
    assert!(repo.path().join("T1.txt").exists());
    assert!(repo.path().join("T2.txt").exists());

    // Event order matches the protocol contract
    let interesting = [
        "rush:started",
        "worker:started",
        "worker:ready",
        "level:started",
        "task:complete",
        "level:complete",
        "merge:complete",
        "rush:stopped",
    ];
    let kinds: Vec<String> = store
        .events()
        .read_all()
        .unwrap()
        .iter()
        .map(|r| r.event.kind().to_string())
        .filter(|k| interesting.contains(&k.as_str()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            "rush:started",
            "worker:started",
            "worker:ready",
            "level:started",
            "task:complete",
            "level:complete",
            "merge:complete",
            "level:started",
            "task:complete",
            "level:complete",
            "merge:complete",
            "rush:stopped",
        ]
    );
}

// ---------------------------------------------------------------------------
// S2: worker crash mid-task is reassigned with no retry-count bump
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s2_worker_crash_reassigns_without_retry_bump() {
    let repo = tempfile::tempdir().unwrap();
    init_repo(repo.path()).await;
    let graph_path = write_graph(
        repo.path(),
        &json!({
            "feature": "demo",
            "tasks": [
                {"id": "T1", "title": "only task", "level": 1,
                 "verification": {"command": "true", "timeout_seconds": 60},
                 "files": {"create": ["t1.txt"]}},
            ],
        }),
    );
    let clock = FakeClock::new(1_000_000);
    let mut store = StateStore::open(repo.path(), "demo", Arc::new(clock.clone())).unwrap();
    let graph = TaskGraph::load(&graph_path).unwrap();
    let tasks: Vec<Task> = graph.all_tasks().cloned().collect();
    store.ensure_graph(&graph.graph_hash(), &tasks).unwrap();
    store.set_current_level(1).unwrap();

    // Worker 0 claims, then crashes (orchestrator's crash path)
    let mut record =
        zerg_core::WorkerRecord::new(0, "zerg/demo/worker-0", repo.path().join("w0"));
    record.status = WorkerStatus::Running;
    store.set_worker_state(record).unwrap();
    let t1 = TaskId::new("T1");
    assert!(store.claim_task(&t1, 0, 1, &NoDependencies).unwrap());

    store
        .append_event(Event::WorkerCrashed {
            worker_id: 0,
            task_id: Some(t1.clone()),
        })
        .unwrap();
    store
        .set_task_status(
            &t1,
            TaskStatus::Failed,
            Some(0),
            Some("worker crashed (infrastructure failure)".into()),
            Some(FailureKind::WorkerCrash),
        )
        .unwrap();
    store.reset_task_to_pending(&t1).unwrap();

    // No retry-count increment for an infrastructure failure
    assert_eq!(store.state().tasks[&t1].retry_count, 0);
    assert!(store.state().tasks[&t1].is_pending());

    // Replacement worker completes the task on the second attempt
    let worktree = repo.path().join(".zerg/worktrees/demo/worker-1");
    zerg_adapters::WorktreeManager::new(repo.path(), "main")
        .create("demo", 1)
        .await
        .unwrap();
    run_worker_pass(
        repo.path(),
        &graph_path,
        &worktree,
        "zerg/demo/worker-1",
        &clock,
        "echo recovered > t1.txt",
        1,
    )
    .await;

    store.load().unwrap();
    let record = &store.state().tasks[&t1];
    assert_eq!(record.status(), TaskStatus::Complete);
    assert_eq!(record.retry_count, 0);
    assert!(store.state().is_complete());

    let kinds: Vec<String> = store
        .events()
        .read_all()
        .unwrap()
        .iter()
        .map(|r| r.event.kind().to_string())
        .collect();
    assert!(kinds.contains(&"worker:crashed".to_string()));
}

// ---------------------------------------------------------------------------
// S3: file-ownership violation rejects the graph at load
// ---------------------------------------------------------------------------

#[test]
fn s3_shared_file_rejected_at_load_naming_both_tasks() {
    let err = TaskGraph::from_value(json!({
        "feature": "demo",
        "tasks": [
            {"id": "T1", "title": "a", "level": 1,
             "files": {"modify": ["src/shared.rs"]}},
            {"id": "T2", "title": "b", "level": 1,
             "files": {"modify": ["src/shared.rs"]}},
        ],
    }))
    .unwrap_err();

    match err {
        GraphError::Invalid { field, violations } => {
            assert_eq!(field, ViolationField::FileOwnership);
            let message = &violations[0].message;
            assert!(message.contains("T1"));
            assert!(message.contains("T2"));
            assert!(message.contains("src/shared.rs"));
        }
        other => panic!("expected validation rejection, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// S4: exponential retry backoff of +1s, +2s, +4s with base 1s / max 8s
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s4_retry_backoff_schedule_then_success() {
    let repo = tempfile::tempdir().unwrap();
    let clock = FakeClock::new(0);
    let mut store = StateStore::open(repo.path(), "demo", Arc::new(clock.clone())).unwrap();
    let graph = TaskGraph::from_value(json!({
        "feature": "demo",
        "tasks": [{"id": "T1", "title": "flaky", "level": 1}],
    }))
    .unwrap();
    let tasks: Vec<Task> = graph.all_tasks().cloned().collect();
    store.ensure_graph(&graph.graph_hash(), &tasks).unwrap();

    let workers = zerg_core::config::WorkersConfig {
        backoff_base_seconds: 1,
        backoff_max_seconds: 8,
        ..Default::default()
    };
    let manager = RetryManager::new(&workers, Arc::new(clock.clone()));
    let t1 = TaskId::new("T1");

    let mut delays = Vec::new();
    for _ in 0..3 {
        let failed_at = clock.now_ms();
        store
            .set_task_status(
                &t1,
                TaskStatus::Failed,
                Some(0),
                Some("connection timed out".into()),
                None,
            )
            .unwrap();
        manager.process_new_failures(&mut store).unwrap();
        let ready = store.state().tasks[&t1].retry_ready_at_ms.unwrap();
        delays.push(ready - failed_at);
        clock.set_ms(ready);
        assert_eq!(manager.check_due(&mut store).unwrap(), vec![t1.clone()]);
    }
    assert_eq!(delays, vec![1_000, 2_000, 4_000]);

    // The third retry succeeds
    store
        .set_task_status(&t1, TaskStatus::Complete, Some(0), None, None)
        .unwrap();
    let record = &store.state().tasks[&t1];
    assert_eq!(record.status(), TaskStatus::Complete);
    assert_eq!(record.retry_count, 3);
}

// ---------------------------------------------------------------------------
// S5: backpressure pause fires exactly once, resume clears the window
// ---------------------------------------------------------------------------

#[test]
fn s5_backpressure_pauses_after_six_failures() {
    let mut controller = BackpressureController::new(&zerg_core::BackpressureConfig {
        enabled: true,
        failure_rate_threshold: 0.5,
        window_size: 10,
    });
    controller.register_level(1, 12);

    // Five failures: rate 1.0 but the verdict fires on the sixth in this
    // run (all claims raced in before the first check)
    for _ in 0..5 {
        controller.record_failure(1);
    }
    assert!(controller.should_pause(1));
    controller.record_failure(1);
    assert!(controller.should_pause(1));

    controller.pause_level(1, 1_000);
    // Exactly once: a paused level never re-reports
    assert!(!controller.should_pause(1));
    assert!(controller.is_paused(1));

    controller.resume_level(1);
    assert!(!controller.is_paused(1));
    assert!((controller.failure_rate(1)).abs() < f64::EPSILON);
    assert!(!controller.should_pause(1));
}

// ---------------------------------------------------------------------------
// S6: gate artifact reuse inside the staleness window
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s6_gate_staleness_reuse_and_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new(0);
    let pipeline = GatePipeline::new(
        dir.path().join(".zerg/artifacts"),
        300,
        true,
        Arc::new(clock.clone()),
    );
    let marker = dir.path().join("invocations");
    let gates = vec![QualityGate {
        name: "lint".into(),
        command: format!("echo run >> {}", marker.display()),
        required: true,
        timeout: 30,
        coverage_threshold: None,
        is_test_gate: false,
    }];

    // t=0: the gate actually runs and passes
    let results = pipeline
        .run_gates_for_level(1, &gates, dir.path(), false)
        .await;
    assert_eq!(results[0].result, zerg_core::GateOutcome::Pass);
    assert_eq!(invocations(&marker), 1);

    // t=120: cached result, command NOT invoked
    clock.advance_secs(120);
    let results = pipeline
        .run_gates_for_level(1, &gates, dir.path(), false)
        .await;
    assert_eq!(results[0].result, zerg_core::GateOutcome::Pass);
    assert_eq!(invocations(&marker), 1);

    // t=301 past the original run: cache expired, command runs again
    clock.advance_secs(181);
    pipeline
        .run_gates_for_level(1, &gates, dir.path(), false)
        .await;
    assert_eq!(invocations(&marker), 2);
}

fn invocations(marker: &Path) -> usize {
    std::fs::read_to_string(marker)
        .map(|t| t.lines().count())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Cross-cutting invariants
// ---------------------------------------------------------------------------

#[test]
fn claim_is_exclusive_and_idempotent() {
    let repo = tempfile::tempdir().unwrap();
    let clock = FakeClock::new(0);
    let mut store = StateStore::open(repo.path(), "demo", Arc::new(clock)).unwrap();
    let graph = TaskGraph::from_value(json!({
        "feature": "demo",
        "tasks": [{"id": "T1", "title": "t", "level": 1}],
    }))
    .unwrap();
    let tasks: Vec<Task> = graph.all_tasks().cloned().collect();
    store.ensure_graph(&graph.graph_hash(), &tasks).unwrap();

    let t1 = TaskId::new("T1");
    assert!(store.claim_task(&t1, 0, 1, &NoDependencies).unwrap());
    // Same worker, same running task: idempotent true
    assert!(store.claim_task(&t1, 0, 1, &NoDependencies).unwrap());
    // Another worker never steals it
    assert!(!store.claim_task(&t1, 1, 1, &NoDependencies).unwrap());
}

#[test]
fn snapshot_round_trip_is_stable() {
    let repo = tempfile::tempdir().unwrap();
    let clock = FakeClock::new(0);
    let mut store = StateStore::open(repo.path(), "demo", Arc::new(clock)).unwrap();
    let graph = TaskGraph::from_value(json!({
        "feature": "demo",
        "tasks": [
            {"id": "T1", "title": "a", "level": 1},
            {"id": "T2", "title": "b", "level": 2, "dependencies": ["T1"]},
        ],
    }))
    .unwrap();
    let tasks: Vec<Task> = graph.all_tasks().cloned().collect();
    store.ensure_graph(&graph.graph_hash(), &tasks).unwrap();

    let bytes_before = std::fs::read(store.state_path()).unwrap();
    store.load().unwrap();
    store.save().unwrap();
    let bytes_after = std::fs::read(store.state_path()).unwrap();
    similar_asserts::assert_eq!(
        String::from_utf8(bytes_before).unwrap(),
        String::from_utf8(bytes_after).unwrap()
    );
}
