// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn explicit_feature_wins() {
    let dir = tempfile::tempdir().unwrap();
    let feature = resolve_feature(dir.path(), Some("explicit".into())).unwrap();
    assert_eq!(feature, "explicit");
}

#[test]
fn feature_falls_back_to_task_graph() {
    let dir = tempfile::tempdir().unwrap();
    let graph_dir = dir.path().join(".gsd/tasks");
    std::fs::create_dir_all(&graph_dir).unwrap();
    std::fs::write(
        graph_dir.join("task-graph.json"),
        r#"{"feature": "from-graph", "tasks": []}"#,
    )
    .unwrap();

    let feature = resolve_feature(dir.path(), None).unwrap();
    assert_eq!(feature, "from-graph");
}

#[test]
fn missing_graph_is_a_helpful_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = resolve_feature(dir.path(), None).unwrap_err();
    assert!(err.to_string().contains("--feature"));
}

#[test]
fn invalid_graph_json_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let graph_dir = dir.path().join(".gsd/tasks");
    std::fs::create_dir_all(&graph_dir).unwrap();
    std::fs::write(graph_dir.join("task-graph.json"), "{oops").unwrap();
    assert!(resolve_feature(dir.path(), None).is_err());
}
