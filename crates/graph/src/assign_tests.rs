// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::graph::TaskGraph;
use serde_json::json;

fn six_task_graph() -> TaskGraph {
    TaskGraph::from_value(json!({
        "feature": "spread",
        "tasks": [
            {"id": "t1", "title": "a", "level": 1, "estimate_minutes": 60,
             "files": {"create": ["a.rs"]}},
            {"id": "t2", "title": "b", "level": 1, "estimate_minutes": 30,
             "files": {"create": ["b.rs"]}},
            {"id": "t3", "title": "c", "level": 1, "estimate_minutes": 30,
             "files": {"create": ["c.rs"]}},
            {"id": "t4", "title": "d", "level": 1, "estimate_minutes": 10,
             "files": {"create": ["d.rs"]}},
            {"id": "t5", "title": "e", "level": 2, "estimate_minutes": 20,
             "files": {"create": ["e.rs"]}},
            {"id": "t6", "title": "f", "level": 2, "estimate_minutes": 20,
             "files": {"create": ["f.rs"]}},
        ],
    }))
    .unwrap()
}

#[test]
fn every_task_gets_a_worker() {
    let graph = six_task_graph();
    let mut assignment = WorkerAssignment::new(2);
    assignment.assign(&graph).unwrap();
    for task in graph.all_tasks() {
        let worker = assignment.get_task_worker(&task.id);
        assert!(worker.is_some(), "task {} unassigned", task.id);
        assert!(worker.unwrap() < 2);
    }
}

#[test]
fn load_is_balanced_by_estimate() {
    let graph = six_task_graph();
    let mut assignment = WorkerAssignment::new(2);
    assignment.assign(&graph).unwrap();
    // Level 1: 60 + 30 + 30 + 10 minutes. Longest-first to least-loaded
    // puts 60 alone against 30+30+10.
    let w_of = |id: &str| assignment.get_task_worker(&TaskId::new(id)).unwrap();
    assert_ne!(w_of("t1"), w_of("t2"));
    assert_eq!(w_of("t2"), w_of("t3"));
}

#[test]
fn single_worker_takes_everything() {
    let graph = six_task_graph();
    let mut assignment = WorkerAssignment::new(1);
    assignment.assign(&graph).unwrap();
    assert_eq!(assignment.tasks_for_worker(0).len(), 6);
}

#[test]
fn zero_workers_clamped_to_one() {
    let assignment = WorkerAssignment::new(0);
    assert_eq!(assignment.worker_count(), 1);
}

#[test]
fn assignments_serialize_for_observability() {
    let graph = six_task_graph();
    let mut assignment = WorkerAssignment::new(3);
    assignment.assign(&graph).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("specs/spread/worker-assignments.json");
    assignment.save_to_file(&path, "spread").unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let doc: AssignmentDoc = serde_json::from_str(&text).unwrap();
    assert_eq!(doc.feature, "spread");
    assert_eq!(doc.worker_count, 3);
    assert_eq!(doc.assignments.len(), 6);
}
