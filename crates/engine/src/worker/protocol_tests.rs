// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use zerg_core::{FakeClock, LevelStatus};

async fn init_worktree(dir: &Path) {
    for args in [
        vec!["init", "-b", "zerg/demo/worker-0"],
        vec!["config", "user.email", "w@example.com"],
        vec!["config", "user.name", "Worker"],
    ] {
        let output = tokio::process::Command::new("git")
            .args(&args)
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        assert!(output.status.success());
    }
    std::fs::write(dir.join("seed.txt"), "seed\n").unwrap();
    let git = zerg_adapters::GitOps::new(dir);
    git.commit("seed", true).await.unwrap();
}

fn graph_json() -> serde_json::Value {
    json!({
        "feature": "demo",
        "tasks": [
            {"id": "t1", "title": "first", "level": 1,
             "files": {"create": ["t1.txt"]}},
            {"id": "t2", "title": "second", "level": 1,
             "dependencies": ["t1"], "files": {"create": ["t2.txt"]}},
        ],
    })
}

struct Setup {
    _state_root: tempfile::TempDir,
    _worktree: tempfile::TempDir,
    protocol: WorkerProtocol,
    store: StateStore,
}

async fn setup(agent_script: &str, threshold: f64) -> Setup {
    let state_root = tempfile::tempdir().unwrap();
    let worktree = tempfile::tempdir().unwrap();
    init_worktree(worktree.path()).await;

    let graph_path = state_root.path().join("task-graph.json");
    std::fs::write(&graph_path, serde_json::to_string(&graph_json()).unwrap()).unwrap();
    let graph = TaskGraph::load(&graph_path).unwrap();

    let clock = FakeClock::new(1_000_000);
    let mut store =
        StateStore::open(state_root.path(), "demo", Arc::new(clock.clone())).unwrap();
    let tasks: Vec<Task> = graph.all_tasks().cloned().collect();
    store.ensure_graph(&graph.graph_hash(), &tasks).unwrap();
    store.set_current_level(1).unwrap();
    store
        .set_level_status(1, LevelStatus::Running, None)
        .unwrap();

    let mut config = ZergConfig::default();
    config.workers.claim_max_wait_seconds = 1;
    config.workers.context_threshold_percent = (threshold * 100.0) as u32;
    config.agent.command = "sh".into();
    config.agent.args = vec!["-c".into(), agent_script.into()];
    config.agent.timeout_minutes = 1;

    let options = WorkerProtocolOptions {
        worker_id: 0,
        feature: "demo".into(),
        branch: "zerg/demo/worker-0".into(),
        worktree: worktree.path().to_path_buf(),
        state_dir: state_root.path().join(".zerg/state"),
        task_graph_path: Some(graph_path),
        spec_dir: None,
    };
    let protocol = WorkerProtocol::new(options, config, Arc::new(clock)).unwrap();
    Setup {
        _state_root: state_root,
        _worktree: worktree,
        protocol,
        store,
    }
}

#[tokio::test]
async fn worker_drains_a_level_respecting_dependencies() {
    let mut s = setup("echo done > $ZERG_TASK_ID.out", 0.8).await;
    let exit = s.protocol.run().await.unwrap();
    assert_eq!(exit, ExitCode::Success);

    s.store.load().unwrap();
    let state = s.store.state();
    assert_eq!(state.tasks[&TaskId::new("t1")].status(), TaskStatus::Complete);
    assert_eq!(state.tasks[&TaskId::new("t2")].status(), TaskStatus::Complete);
    assert_eq!(state.workers[&0].status, WorkerStatus::Stopped);
    assert_eq!(state.workers[&0].tasks_completed, 2);
    assert!(state.workers[&0].current_task.is_none());

    // t1 was claimed before t2 (dependency order)
    let events = s.store.events().read_all().unwrap();
    let claims: Vec<String> = events
        .iter()
        .filter_map(|r| match &r.event {
            Event::TaskClaimed { task_id, .. } => Some(task_id.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(claims, vec!["t1".to_string(), "t2".to_string()]);
}

#[tokio::test]
async fn failing_agent_reports_task_failed() {
    let mut s = setup("exit 9", 0.8).await;
    let exit = s.protocol.run().await.unwrap();
    // The worker survives task failures and stops when nothing is left
    assert_eq!(exit, ExitCode::Success);

    s.store.load().unwrap();
    let record = &s.store.state().tasks[&TaskId::new("t1")];
    assert_eq!(record.status(), TaskStatus::Failed);
    assert!(record.last_error.as_deref().unwrap().contains("exited 9"));
    assert_eq!(record.retry_count, 1);
    // t2's dependency never completed, so it stays pending
    assert_eq!(
        s.store.state().tasks[&TaskId::new("t2")].status(),
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn paused_store_blocks_claims() {
    let mut s = setup("echo done > out.txt", 0.8).await;
    s.store.set_paused(true).unwrap();
    let exit = s.protocol.run().await.unwrap();
    assert_eq!(exit, ExitCode::Success);

    s.store.load().unwrap();
    assert_eq!(
        s.store.state().tasks[&TaskId::new("t1")].status(),
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn zero_budget_checkpoints_immediately() {
    let mut s = setup("echo done", 0.0).await;
    let exit = s.protocol.run().await.unwrap();
    assert_eq!(exit, ExitCode::Checkpoint);

    s.store.load().unwrap();
    assert_eq!(s.store.state().workers[&0].status, WorkerStatus::Checkpointing);
    let kinds: Vec<String> = s
        .store
        .events()
        .read_all()
        .unwrap()
        .iter()
        .map(|r| r.event.kind().to_string())
        .collect();
    assert!(kinds.contains(&"worker:checkpoint".to_string()));
}

#[tokio::test]
async fn repeated_verification_failure_escalates() {
    let state_root = tempfile::tempdir().unwrap();
    let worktree = tempfile::tempdir().unwrap();
    init_worktree(worktree.path()).await;

    let graph_path = state_root.path().join("task-graph.json");
    std::fs::write(
        &graph_path,
        serde_json::to_string(&json!({
            "feature": "demo",
            "tasks": [
                {"id": "t1", "title": "unverifiable", "level": 1,
                 "verification": {"command": "test -f never.txt", "timeout_seconds": 5}},
            ],
        }))
        .unwrap(),
    )
    .unwrap();
    let graph = TaskGraph::load(&graph_path).unwrap();
    let clock = FakeClock::new(1_000_000);
    let mut store = StateStore::open(state_root.path(), "demo", Arc::new(clock.clone())).unwrap();
    let tasks: Vec<Task> = graph.all_tasks().cloned().collect();
    store.ensure_graph(&graph.graph_hash(), &tasks).unwrap();
    store.set_current_level(1).unwrap();
    // Two earlier attempts already burned on this verification
    store
        .transact(|state, _events| {
            if let Some(record) = state.tasks.get_mut(&TaskId::new("t1")) {
                record.retry_count = 2;
            }
            Ok(())
        })
        .unwrap();

    let mut config = ZergConfig::default();
    config.workers.claim_max_wait_seconds = 1;
    config.agent.command = "sh".into();
    config.agent.args = vec!["-c".into(), "true".into()];
    config.agent.timeout_minutes = 1;
    config.verification.max_retries = 0;

    let options = WorkerProtocolOptions {
        worker_id: 0,
        feature: "demo".into(),
        branch: "zerg/demo/worker-0".into(),
        worktree: worktree.path().to_path_buf(),
        state_dir: state_root.path().join(".zerg/state"),
        task_graph_path: Some(graph_path),
        spec_dir: None,
    };
    let mut protocol = WorkerProtocol::new(options, config, Arc::new(clock)).unwrap();
    protocol.run().await.unwrap();

    let monitor =
        zerg_storage::EscalationMonitor::new(&state_root.path().join(".zerg/state"));
    let unresolved = monitor.unresolved();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(
        unresolved[0].category,
        zerg_core::EscalationCategory::VerificationUnclear
    );
    assert_eq!(unresolved[0].task_id, TaskId::new("t1"));
}

#[test]
fn options_from_env_requires_identity() {
    // Isolated check of the error path (no env set in test processes)
    std::env::remove_var("ZERG_WORKER_ID");
    let err = WorkerProtocolOptions::from_env().unwrap_err();
    assert!(err.to_string().contains("ZERG_WORKER_ID"));
}
