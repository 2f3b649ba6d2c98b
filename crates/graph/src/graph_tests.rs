// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn diamond_graph() -> TaskGraph {
    TaskGraph::from_value(json!({
        "feature": "auth",
        "tasks": [
            {"id": "t-base", "title": "base", "level": 1, "estimate_minutes": 10},
            {"id": "t-left", "title": "left", "level": 2,
             "dependencies": ["t-base"], "estimate_minutes": 30},
            {"id": "t-right", "title": "right", "level": 2,
             "dependencies": ["t-base"], "estimate_minutes": 5},
            {"id": "t-top", "title": "top", "level": 3,
             "dependencies": ["t-left", "t-right"], "estimate_minutes": 10},
        ],
    }))
    .unwrap()
}

#[test]
fn load_rejects_missing_file() {
    let err = TaskGraph::load(std::path::Path::new("/nonexistent/task-graph.json")).unwrap_err();
    assert!(matches!(err, GraphError::NotFound(_)));
}

#[test]
fn load_parses_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("task-graph.json");
    std::fs::write(
        &path,
        serde_json::to_string(&json!({
            "feature": "demo",
            "tasks": [{"id": "t1", "title": "only", "level": 1}],
        }))
        .unwrap(),
    )
    .unwrap();
    let graph = TaskGraph::load(&path).unwrap();
    assert_eq!(graph.feature(), "demo");
    assert_eq!(graph.total_tasks(), 1);
}

#[test]
fn file_ownership_violation_rejects_at_load() {
    let err = TaskGraph::from_value(json!({
        "feature": "clash",
        "tasks": [
            {"id": "t1", "title": "a", "level": 1, "files": {"modify": ["same.rs"]}},
            {"id": "t2", "title": "b", "level": 1, "files": {"modify": ["same.rs"]}},
        ],
    }))
    .unwrap_err();
    match err {
        GraphError::Invalid { field, violations } => {
            assert_eq!(field, ViolationField::FileOwnership);
            assert!(violations[0].message.contains("same.rs"));
            assert!(violations[0].message.contains("t1"));
            assert!(violations[0].message.contains("t2"));
        }
        other => panic!("expected ownership error, got {other:?}"),
    }
}

#[test]
fn levels_are_sorted_and_distinct() {
    let graph = diamond_graph();
    assert_eq!(graph.levels(), vec![1, 2, 3]);
    assert_eq!(graph.tasks_for_level(2).len(), 2);
}

#[test]
fn ready_tasks_respect_dependencies() {
    let graph = diamond_graph();
    let none = std::collections::HashSet::new();
    let ready = graph.get_ready_tasks(&none, &none);
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id, "t-base");

    let completed: std::collections::HashSet<TaskId> = [TaskId::new("t-base")].into();
    let ready: Vec<&str> = graph
        .get_ready_tasks(&completed, &none)
        .iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(ready, vec!["t-left", "t-right"]);

    let in_progress: std::collections::HashSet<TaskId> = [TaskId::new("t-left")].into();
    let ready: Vec<&str> = graph
        .get_ready_tasks(&completed, &in_progress)
        .iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(ready, vec!["t-right"]);
}

#[test]
fn topological_sort_is_deterministic_and_ordered() {
    let graph = diamond_graph();
    let order = graph.topological_sort();
    assert_eq!(order.len(), 4);
    assert_eq!(order[0], "t-base");
    assert_eq!(order[1], "t-left");
    assert_eq!(order[2], "t-right");
    assert_eq!(order[3], "t-top");
}

#[test]
fn critical_path_follows_longest_estimates() {
    let graph = diamond_graph();
    let critical_path = graph.critical_path();
    let path: Vec<&str> = critical_path.iter().map(|t| t.as_str()).collect();
    // base(10) -> left(30) -> top(10) dominates base -> right(5) -> top
    assert_eq!(path, vec!["t-base", "t-left", "t-top"]);
}

#[test]
fn declared_critical_path_wins() {
    let graph = TaskGraph::from_value(json!({
        "feature": "declared",
        "critical_path": ["t2"],
        "tasks": [
            {"id": "t1", "title": "a", "level": 1, "estimate_minutes": 100},
            {"id": "t2", "title": "b", "level": 1, "estimate_minutes": 1},
        ],
    }))
    .unwrap();
    let critical_path = graph.critical_path();
    let path: Vec<&str> = critical_path.iter().map(|t| t.as_str()).collect();
    assert_eq!(path, vec!["t2"]);
}

#[test]
fn graph_hash_is_stable_and_content_sensitive() {
    let graph_a = diamond_graph();
    let graph_b = diamond_graph();
    assert_eq!(graph_a.graph_hash(), graph_b.graph_hash());

    let changed = TaskGraph::from_value(json!({
        "feature": "auth",
        "tasks": [
            {"id": "t-base", "title": "base RENAMED", "level": 1, "estimate_minutes": 10},
            {"id": "t-left", "title": "left", "level": 2,
             "dependencies": ["t-base"], "estimate_minutes": 30},
            {"id": "t-right", "title": "right", "level": 2,
             "dependencies": ["t-base"], "estimate_minutes": 5},
            {"id": "t-top", "title": "top", "level": 3,
             "dependencies": ["t-left", "t-right"], "estimate_minutes": 10},
        ],
    }))
    .unwrap();
    assert_ne!(graph_a.graph_hash(), changed.graph_hash());
}
