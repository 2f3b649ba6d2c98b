// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsed task graph with dependency queries.

use crate::validate::{
    validate_dependencies, validate_file_ownership, validate_schema, GraphError, ViolationField,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use zerg_core::{Task, TaskId, Verification};

/// Raw task graph document (`task-graph.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDoc {
    #[serde(default)]
    pub schema: String,
    pub feature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_path: Option<Vec<TaskId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallelization: Option<u32>,
    /// Level metadata keyed by level number; informational.
    #[serde(default)]
    pub levels: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Validated task graph with derived dependency indexes.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    doc: GraphDoc,
    tasks: IndexMap<TaskId, Task>,
    dependents: HashMap<TaskId, Vec<TaskId>>,
}

impl TaskGraph {
    /// Load and validate a task graph from a JSON file.
    pub fn load(path: &Path) -> Result<Self, GraphError> {
        if !path.exists() {
            return Err(GraphError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| GraphError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        Self::from_value(value)
    }

    /// Validate and index a task graph document.
    pub fn from_value(value: serde_json::Value) -> Result<Self, GraphError> {
        let schema_violations = validate_schema(&value);
        if !schema_violations.is_empty() {
            return Err(GraphError::Invalid {
                field: ViolationField::Schema,
                violations: schema_violations,
            });
        }

        let doc: GraphDoc = serde_json::from_value(value)?;

        let ownership_violations = validate_file_ownership(&doc.tasks);
        if !ownership_violations.is_empty() {
            return Err(GraphError::Invalid {
                field: ViolationField::FileOwnership,
                violations: ownership_violations,
            });
        }

        let dependency_violations = validate_dependencies(&doc.tasks);
        if !dependency_violations.is_empty() {
            return Err(GraphError::Invalid {
                field: ViolationField::Dependencies,
                violations: dependency_violations,
            });
        }

        let tasks: IndexMap<TaskId, Task> = doc
            .tasks
            .iter()
            .map(|t| (t.id.clone(), t.clone()))
            .collect();
        let mut dependents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for task in tasks.values() {
            for dep in &task.dependencies {
                dependents.entry(dep.clone()).or_default().push(task.id.clone());
            }
        }

        tracing::info!(
            feature = %doc.feature,
            tasks = tasks.len(),
            "parsed task graph"
        );

        Ok(Self {
            doc,
            tasks,
            dependents,
        })
    }

    pub fn feature(&self) -> &str {
        &self.doc.feature
    }

    pub fn doc(&self) -> &GraphDoc {
        &self.doc
    }

    pub fn total_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Sorted list of distinct level numbers.
    pub fn levels(&self) -> Vec<u32> {
        let mut levels: Vec<u32> = self
            .tasks
            .values()
            .map(|t| t.level)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        levels.sort_unstable();
        levels
    }

    pub fn tasks_for_level(&self, level: u32) -> Vec<&Task> {
        self.tasks.values().filter(|t| t.level == level).collect()
    }

    pub fn dependencies(&self, id: &TaskId) -> &[TaskId] {
        self.tasks
            .get(id)
            .map(|t| t.dependencies.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents(&self, id: &TaskId) -> &[TaskId] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn are_dependencies_complete(&self, id: &TaskId, completed: &HashSet<TaskId>) -> bool {
        self.dependencies(id).iter().all(|dep| completed.contains(dep))
    }

    /// Tasks whose dependencies are all complete and which are neither
    /// complete nor in progress themselves.
    pub fn get_ready_tasks(
        &self,
        completed: &HashSet<TaskId>,
        in_progress: &HashSet<TaskId>,
    ) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|t| !completed.contains(&t.id) && !in_progress.contains(&t.id))
            .filter(|t| self.are_dependencies_complete(&t.id, completed))
            .collect()
    }

    /// Tasks in topological order, deterministic: level first, then id.
    ///
    /// Validation has already rejected cycles, so this always covers every
    /// task.
    pub fn topological_sort(&self) -> Vec<TaskId> {
        let mut in_degree: HashMap<&TaskId, usize> = self
            .tasks
            .values()
            .map(|t| (&t.id, t.dependencies.len()))
            .collect();

        let mut ready: Vec<&TaskId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut result = Vec::with_capacity(self.tasks.len());

        while !ready.is_empty() {
            ready.sort_by(|a, b| {
                let la = self.tasks.get(*a).map(|t| t.level).unwrap_or(0);
                let lb = self.tasks.get(*b).map(|t| t.level).unwrap_or(0);
                la.cmp(&lb).then_with(|| a.cmp(b))
            });
            let id = ready.remove(0);
            result.push(id.clone());

            for dependent in self.dependents.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(dependent);
                    }
                }
            }
        }

        result
    }

    /// Longest path by estimated minutes, via dynamic programming over the
    /// topological order. A pre-declared `critical_path` in the document
    /// wins.
    pub fn critical_path(&self) -> Vec<TaskId> {
        if let Some(path) = &self.doc.critical_path {
            if !path.is_empty() {
                return path.clone();
            }
        }

        let order = self.topological_sort();
        if order.is_empty() {
            return Vec::new();
        }

        let estimate =
            |id: &TaskId| -> u64 { self.tasks.get(id).and_then(|t| t.estimate_minutes).unwrap_or(0) as u64 };

        let mut dist: HashMap<&TaskId, u64> = HashMap::new();
        let mut pred: HashMap<&TaskId, Option<&TaskId>> = HashMap::new();
        for id in &order {
            dist.insert(id, 0);
            pred.insert(id, None);
        }

        for id in &order {
            if let Some(task) = self.tasks.get(id) {
                for dep in &task.dependencies {
                    let through = dist.get(dep).copied().unwrap_or(0) + estimate(dep);
                    if through > dist.get(id).copied().unwrap_or(0) {
                        dist.insert(id, through);
                        if let Some((key, _)) = self.tasks.get_key_value(dep) {
                            pred.insert(id, Some(key));
                        }
                    }
                }
            }
        }

        let end = order
            .iter()
            .max_by_key(|id| dist.get(*id).copied().unwrap_or(0) + estimate(*id));
        let Some(end) = end else {
            return Vec::new();
        };

        let mut path = vec![end.clone()];
        let mut current = pred.get(end).copied().flatten();
        while let Some(id) = current {
            path.insert(0, id.clone());
            current = pred.get(id).copied().flatten();
        }
        path
    }

    pub fn verification(&self, id: &TaskId) -> Option<&Verification> {
        self.tasks.get(id).and_then(|t| t.verification.as_ref())
    }

    /// Content hash over the canonical task list. The state store refuses
    /// to reuse a snapshot recorded under a different hash.
    pub fn graph_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.doc.feature.as_bytes());
        for task in self.tasks.values() {
            // serde_json serialization of a Task is deterministic (struct
            // field order), so hashing the concatenation is stable.
            if let Ok(bytes) = serde_json::to_vec(task) {
                hasher.update(&bytes);
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
