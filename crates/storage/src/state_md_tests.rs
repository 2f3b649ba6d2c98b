// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use zerg_core::{LevelRecord, TaskId, TaskRecord, TaskStatus, WorkerRecord, WorkerStatus};

#[test]
fn renders_levels_workers_and_tasks() {
    let mut state = FeatureState {
        feature: "auth".into(),
        current_level: 1,
        ..FeatureState::default()
    };
    state.levels.insert(1, LevelRecord::new(1, 2));
    let mut worker = WorkerRecord::new(0, "zerg/auth/worker-0", "/w0".into());
    worker.status = WorkerStatus::Running;
    worker.current_task = Some(TaskId::new("t1"));
    state.workers.insert(0, worker);
    state.tasks.insert(
        TaskId::new("t1"),
        TaskRecord {
            level: 1,
            status: Some(TaskStatus::InProgress),
            worker_id: Some(0),
            ..TaskRecord::default()
        },
    );

    let md = render(&state);
    assert!(md.contains("# ZERG State: auth"));
    assert!(md.contains("| 1 | pending | none | 0 | 0 | 2 |"));
    assert!(md.contains("| 0 | running | t1 | 0 | zerg/auth/worker-0 |"));
    assert!(md.contains("| t1 | 1 | in_progress | 0 | 0 | - |"));
}

#[test]
fn renders_paused_and_error_markers() {
    let state = FeatureState {
        feature: "auth".into(),
        paused: true,
        error: Some("merge conflict in level 2".into()),
        ..FeatureState::default()
    };
    let md = render(&state);
    assert!(md.contains("**PAUSED**"));
    assert!(md.contains("merge conflict in level 2"));
}

#[test]
fn empty_state_reports_not_started() {
    let state = FeatureState {
        feature: "auth".into(),
        ..FeatureState::default()
    };
    let md = render(&state);
    assert!(md.contains("not started"));
}
