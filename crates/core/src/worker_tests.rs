// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    spawning      = { WorkerStatus::Spawning, false, false },
    initializing  = { WorkerStatus::Initializing, false, false },
    running       = { WorkerStatus::Running, false, true },
    ready         = { WorkerStatus::Ready, false, true },
    idle          = { WorkerStatus::Idle, false, true },
    checkpointing = { WorkerStatus::Checkpointing, false, false },
    stalled       = { WorkerStatus::Stalled, false, false },
    crashed       = { WorkerStatus::Crashed, true, false },
    stopped       = { WorkerStatus::Stopped, true, false },
)]
fn status_lattice(status: WorkerStatus, terminal: bool, ready_for_tasks: bool) {
    assert_eq!(status.is_terminal(), terminal);
    assert_eq!(status.is_active(), !terminal);
    assert_eq!(status.is_ready_for_tasks(), ready_for_tasks);
}

#[test]
fn new_record_starts_spawning_without_resources() {
    let record = WorkerRecord::new(3, "zerg/feat/worker-3", PathBuf::from("/tmp/wt"));
    assert_eq!(record.worker_id, 3);
    assert_eq!(record.status, WorkerStatus::Spawning);
    assert!(record.port.is_none());
    assert!(record.current_task.is_none());
    assert_eq!(record.tasks_completed, 0);
}

#[test]
fn record_serde_round_trip() {
    let mut record = WorkerRecord::new(0, "zerg/feat/worker-0", PathBuf::from("/w/0"));
    record.status = WorkerStatus::Running;
    record.port = Some(50123);
    record.current_task = Some(TaskId::new("t1"));
    let json = serde_json::to_string(&record).unwrap();
    let back: WorkerRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
}

#[test]
fn status_serializes_snake_case() {
    let json = serde_json::to_string(&WorkerStatus::Checkpointing).unwrap();
    assert_eq!(json, "\"checkpointing\"");
}
