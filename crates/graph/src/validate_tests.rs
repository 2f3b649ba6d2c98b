// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn task(id: &str, level: u32, deps: &[&str]) -> Task {
    serde_json::from_value(json!({
        "id": id,
        "title": format!("task {id}"),
        "level": level,
        "dependencies": deps,
    }))
    .unwrap()
}

fn task_with_files(id: &str, level: u32, create: &[&str], modify: &[&str]) -> Task {
    serde_json::from_value(json!({
        "id": id,
        "title": format!("task {id}"),
        "level": level,
        "files": {"create": create, "modify": modify},
    }))
    .unwrap()
}

#[test]
fn schema_accepts_minimal_graph() {
    let doc = json!({
        "feature": "auth",
        "tasks": [{"id": "t1", "title": "one", "level": 1}],
    });
    assert!(validate_schema(&doc).is_empty());
}

#[test]
fn schema_collects_all_violations() {
    let doc = json!({
        "tasks": [
            {"id": "t1", "level": 0},
            {"title": "no id", "level": 1},
            {"id": "t1", "title": "dup", "level": 1},
        ],
    });
    let violations = validate_schema(&doc);
    let messages: Vec<&str> = violations.iter().map(|v| v.message.as_str()).collect();
    assert!(messages.iter().any(|m| m.contains("'feature'")));
    assert!(messages.iter().any(|m| m.contains("level must be >= 1")));
    assert!(messages.iter().any(|m| m.contains("missing 'id'")));
    assert!(messages.iter().any(|m| m.contains("duplicate task id 't1'")));
    assert!(messages.iter().any(|m| m.contains("missing 'title'")));
}

#[test]
fn schema_rejects_illegal_status() {
    let doc = json!({
        "feature": "f",
        "tasks": [{"id": "t1", "title": "x", "level": 1, "status": "exploded"}],
    });
    let violations = validate_schema(&doc);
    assert_eq!(violations.len(), 1);
    assert!(violations[0].message.contains("illegal status 'exploded'"));
}

#[test]
fn ownership_disjoint_within_level_passes() {
    let tasks = vec![
        task_with_files("t1", 1, &["a.rs"], &[]),
        task_with_files("t2", 1, &["b.rs"], &["c.rs"]),
    ];
    assert!(validate_file_ownership(&tasks).is_empty());
}

#[test]
fn ownership_conflict_names_both_tasks_and_file() {
    let tasks = vec![
        task_with_files("t1", 1, &["shared.rs"], &[]),
        task_with_files("t2", 1, &[], &["shared.rs"]),
    ];
    let violations = validate_file_ownership(&tasks);
    assert_eq!(violations.len(), 1);
    let message = &violations[0].message;
    assert!(message.contains("t1"));
    assert!(message.contains("t2"));
    assert!(message.contains("shared.rs"));
    assert_eq!(violations[0].field, ViolationField::FileOwnership);
}

#[test]
fn ownership_same_file_across_levels_is_fine() {
    let tasks = vec![
        task_with_files("t1", 1, &[], &["evolving.rs"]),
        task_with_files("t2", 2, &[], &["evolving.rs"]),
    ];
    assert!(validate_file_ownership(&tasks).is_empty());
}

#[test]
fn dependencies_unknown_id_reported() {
    let tasks = vec![task("t1", 1, &["ghost"])];
    let violations = validate_dependencies(&tasks);
    assert_eq!(violations.len(), 1);
    assert!(violations[0].message.contains("unknown task 'ghost'"));
}

#[test]
fn dependencies_deeper_level_reported() {
    let tasks = vec![task("t1", 1, &["t2"]), task("t2", 2, &[])];
    let violations = validate_dependencies(&tasks);
    assert_eq!(violations.len(), 1);
    assert!(violations[0].message.contains("deeper level"));
}

#[test]
fn dependencies_cycle_detected_by_residue() {
    let tasks = vec![
        task("t1", 1, &["t3"]),
        task("t2", 1, &["t1"]),
        task("t3", 1, &["t2"]),
        task("t4", 1, &[]),
    ];
    let violations = validate_dependencies(&tasks);
    assert_eq!(violations.len(), 1);
    let message = &violations[0].message;
    assert!(message.contains("cycle"));
    // All three cycle members are named; the acyclic task is not
    assert!(message.contains("t1") && message.contains("t2") && message.contains("t3"));
    assert!(!message.contains("t4"));
}

#[test]
fn dependencies_valid_dag_passes() {
    let tasks = vec![
        task("t1", 1, &[]),
        task("t2", 1, &["t1"]),
        task("t3", 2, &["t1", "t2"]),
    ];
    assert!(validate_dependencies(&tasks).is_empty());
}
