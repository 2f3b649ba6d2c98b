// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static task → worker assignment.
//!
//! File ownership is already disjoint within a level (graph validation), so
//! any partition is safe; the policy spreads work evenly by estimate:
//! within each level, tasks are handed out longest-first to the worker with
//! the least assigned minutes.

use crate::graph::TaskGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use zerg_core::TaskId;

#[derive(Debug, Error)]
pub enum AssignError {
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("failed to write assignments {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to serialize assignments: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialized assignment document for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentDoc {
    pub feature: String,
    pub worker_count: u32,
    pub assignments: HashMap<TaskId, u32>,
}

/// Static mapping of tasks to worker slots.
#[derive(Debug, Clone)]
pub struct WorkerAssignment {
    worker_count: u32,
    by_task: HashMap<TaskId, u32>,
}

impl WorkerAssignment {
    pub fn new(worker_count: u32) -> Self {
        Self {
            worker_count: worker_count.max(1),
            by_task: HashMap::new(),
        }
    }

    pub fn worker_count(&self) -> u32 {
        self.worker_count
    }

    /// Compute the assignment for every task in the graph.
    pub fn assign(&mut self, graph: &TaskGraph) -> Result<(), AssignError> {
        if self.worker_count == 0 {
            return Err(AssignError::NoWorkers);
        }
        self.by_task.clear();

        for level in graph.levels() {
            let mut tasks = graph.tasks_for_level(level);
            // Longest first so large tasks anchor the balance
            tasks.sort_by(|a, b| {
                b.estimate_minutes
                    .unwrap_or(0)
                    .cmp(&a.estimate_minutes.unwrap_or(0))
                    .then_with(|| a.id.cmp(&b.id))
            });

            let mut load: Vec<u64> = vec![0; self.worker_count as usize];
            for task in tasks {
                let worker = load
                    .iter()
                    .enumerate()
                    .min_by_key(|(id, minutes)| (**minutes, *id))
                    .map(|(id, _)| id as u32)
                    .unwrap_or(0);
                load[worker as usize] += u64::from(task.estimate_minutes.unwrap_or(10));
                self.by_task.insert(task.id.clone(), worker);
            }
        }

        tracing::debug!(
            tasks = self.by_task.len(),
            workers = self.worker_count,
            "computed worker assignments"
        );
        Ok(())
    }

    pub fn get_task_worker(&self, id: &TaskId) -> Option<u32> {
        self.by_task.get(id).copied()
    }

    pub fn tasks_for_worker(&self, worker_id: u32) -> Vec<&TaskId> {
        let mut tasks: Vec<&TaskId> = self
            .by_task
            .iter()
            .filter(|(_, w)| **w == worker_id)
            .map(|(id, _)| id)
            .collect();
        tasks.sort();
        tasks
    }

    /// Persist as JSON next to the feature spec for observability.
    pub fn save_to_file(&self, path: &Path, feature: &str) -> Result<(), AssignError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| AssignError::Io {
                path: path.display().to_string(),
                source,
            })?;
        }
        let doc = AssignmentDoc {
            feature: feature.to_string(),
            worker_count: self.worker_count,
            assignments: self.by_task.clone(),
        };
        let json = serde_json::to_string_pretty(&doc)?;
        std::fs::write(path, json).map_err(|source| AssignError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
#[path = "assign_tests.rs"]
mod tests;
