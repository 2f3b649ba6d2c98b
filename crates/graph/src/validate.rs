// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task graph validation.
//!
//! Three passes, each collecting every violation it finds before failing:
//! schema, file ownership, dependencies. A graph that fails any pass is
//! rejected whole; there is no partial load.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use zerg_core::Task;

/// Which validation pass produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationField {
    Schema,
    FileOwnership,
    Dependencies,
}

impl std::fmt::Display for ViolationField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ViolationField::Schema => "schema",
            ViolationField::FileOwnership => "file_ownership",
            ViolationField::Dependencies => "dependencies",
        };
        write!(f, "{s}")
    }
}

/// A single validation violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: ViolationField,
    pub message: String,
}

/// Errors loading or validating a task graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("task graph not found: {0}")]
    NotFound(String),
    #[error("failed to read task graph {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("task graph is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid task graph ({field}): {}", render_messages(.violations))]
    Invalid {
        field: ViolationField,
        violations: Vec<Violation>,
    },
}

fn render_messages(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Pass 1: structural checks on the raw JSON document.
pub fn validate_schema(doc: &serde_json::Value) -> Vec<Violation> {
    let mut violations = Vec::new();
    let push = |violations: &mut Vec<Violation>, message: String| {
        violations.push(Violation {
            field: ViolationField::Schema,
            message,
        });
    };

    let Some(obj) = doc.as_object() else {
        push(&mut violations, "top level must be an object".into());
        return violations;
    };

    if obj.get("feature").and_then(|v| v.as_str()).is_none() {
        push(&mut violations, "missing string field 'feature'".into());
    }

    let Some(tasks) = obj.get("tasks").and_then(|v| v.as_array()) else {
        push(&mut violations, "missing array field 'tasks'".into());
        return violations;
    };

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for (index, task) in tasks.iter().enumerate() {
        let Some(task_obj) = task.as_object() else {
            push(&mut violations, format!("tasks[{index}] must be an object"));
            continue;
        };
        let id = task_obj.get("id").and_then(|v| v.as_str());
        match id {
            None => push(&mut violations, format!("tasks[{index}] missing 'id'")),
            Some(id) => {
                if !seen_ids.insert(id) {
                    push(&mut violations, format!("duplicate task id '{id}'"));
                }
            }
        }
        let label = id.unwrap_or("?");
        if task_obj.get("title").and_then(|v| v.as_str()).is_none() {
            push(&mut violations, format!("task '{label}' missing 'title'"));
        }
        match task_obj.get("level").and_then(|v| v.as_u64()) {
            None => push(&mut violations, format!("task '{label}' missing integer 'level'")),
            Some(0) => push(&mut violations, format!("task '{label}' level must be >= 1")),
            Some(_) => {}
        }
        if let Some(status) = task_obj.get("status").and_then(|v| v.as_str()) {
            const LEGAL: &[&str] = &[
                "pending",
                "in_progress",
                "paused",
                "complete",
                "failed",
                "skipped",
            ];
            if !LEGAL.contains(&status) {
                push(
                    &mut violations,
                    format!("task '{label}' has illegal status '{status}'"),
                );
            }
        }
    }

    violations
}

/// Pass 2: within each level, `create ∪ modify` sets must be pairwise
/// disjoint. Violations name both tasks and the shared file.
pub fn validate_file_ownership(tasks: &[Task]) -> Vec<Violation> {
    let mut violations = Vec::new();
    // (level, file) -> first owning task id
    let mut owners: HashMap<(u32, &str), &str> = HashMap::new();

    for task in tasks {
        for file in task.files.owned() {
            match owners.insert((task.level, file), task.id.as_str()) {
                Some(previous) if previous != task.id.as_str() => {
                    violations.push(Violation {
                        field: ViolationField::FileOwnership,
                        message: format!(
                            "level {}: tasks '{}' and '{}' both own file '{}'",
                            task.level, previous, task.id, file
                        ),
                    });
                }
                _ => {}
            }
        }
    }

    violations
}

/// Pass 3: every dependency exists, no cycles (Kahn residue), and no task
/// depends on a deeper level than its own.
pub fn validate_dependencies(tasks: &[Task]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    for task in tasks {
        for dep in &task.dependencies {
            match by_id.get(dep.as_str()) {
                None => violations.push(Violation {
                    field: ViolationField::Dependencies,
                    message: format!("task '{}' depends on unknown task '{}'", task.id, dep),
                }),
                Some(dep_task) if dep_task.level > task.level => violations.push(Violation {
                    field: ViolationField::Dependencies,
                    message: format!(
                        "task '{}' (level {}) depends on '{}' at deeper level {}",
                        task.id, task.level, dep, dep_task.level
                    ),
                }),
                Some(_) => {}
            }
        }
    }

    // Kahn's algorithm; whatever never reaches in-degree zero is cyclic.
    let mut in_degree: HashMap<&str, usize> = tasks.iter().map(|t| (t.id.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in tasks {
        for dep in &task.dependencies {
            if by_id.contains_key(dep.as_str()) {
                *in_degree.entry(task.id.as_str()).or_default() += 1;
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(task.id.as_str());
            }
        }
    }

    let mut queue: Vec<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0usize;
    while let Some(id) = queue.pop() {
        visited += 1;
        for &dependent in dependents.get(id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push(dependent);
                }
            }
        }
    }

    if visited != tasks.len() {
        let mut residue: Vec<String> = in_degree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(id, _)| (*id).to_string())
            .collect();
        residue.sort();
        violations.push(Violation {
            field: ViolationField::Dependencies,
            message: format!("dependency cycle involving: {}", residue.join(", ")),
        });
    }

    violations
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
