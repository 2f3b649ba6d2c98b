// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Level progress queries over the graph + persisted state.
//!
//! The store is the ground truth; these helpers answer the orchestrator's
//! per-level questions (resolved? pending work? can we advance?) without
//! keeping a second mutable copy of anything.

use zerg_core::{MergeStatus, TaskId, TaskStatus};
use zerg_graph::TaskGraph;
use zerg_storage::FeatureState;

/// Read-only level progress computed from the graph and a state snapshot.
pub struct LevelProgress<'a> {
    graph: &'a TaskGraph,
    state: &'a FeatureState,
}

impl<'a> LevelProgress<'a> {
    pub fn new(graph: &'a TaskGraph, state: &'a FeatureState) -> Self {
        Self { graph, state }
    }

    fn status_of(&self, id: &TaskId) -> TaskStatus {
        self.state
            .tasks
            .get(id)
            .map(|r| r.status())
            .unwrap_or(TaskStatus::Pending)
    }

    /// Every task at the level is complete or failed (nothing pending,
    /// paused, or running).
    pub fn is_level_resolved(&self, level: u32) -> bool {
        let tasks = self.graph.tasks_for_level(level);
        !tasks.is_empty()
            && tasks.iter().all(|t| {
                matches!(
                    self.status_of(&t.id),
                    TaskStatus::Complete | TaskStatus::Failed | TaskStatus::Skipped
                )
            })
    }

    /// Every task at the level completed (failed tasks block advancement).
    pub fn is_level_fully_complete(&self, level: u32) -> bool {
        self.graph.tasks_for_level(level).iter().all(|t| {
            matches!(
                self.status_of(&t.id),
                TaskStatus::Complete | TaskStatus::Skipped
            )
        })
    }

    /// Task ids at the level that still need work (pending or paused).
    pub fn pending_tasks_for_level(&self, level: u32) -> Vec<TaskId> {
        self.graph
            .tasks_for_level(level)
            .into_iter()
            .filter(|t| {
                matches!(
                    self.status_of(&t.id),
                    TaskStatus::Pending | TaskStatus::Paused
                )
            })
            .map(|t| t.id.clone())
            .collect()
    }

    /// Tasks at the level that are neither complete nor skipped (includes
    /// failed and in-progress work).
    pub fn unfinished_tasks_for_level(&self, level: u32) -> Vec<TaskId> {
        self.graph
            .tasks_for_level(level)
            .into_iter()
            .filter(|t| {
                !matches!(
                    self.status_of(&t.id),
                    TaskStatus::Complete | TaskStatus::Skipped
                )
            })
            .map(|t| t.id.clone())
            .collect()
    }

    /// The next level after `level`, if the graph has one.
    pub fn next_level(&self, level: u32) -> Option<u32> {
        self.graph.levels().into_iter().find(|l| *l > level)
    }

    /// Advancement requires the level fully complete and its merge
    /// recorded as complete (or deferred as pending).
    pub fn can_advance(&self, level: u32) -> bool {
        if !self.is_level_fully_complete(level) {
            return false;
        }
        let merge_ok = self
            .state
            .levels
            .get(&level)
            .map(|record| {
                matches!(
                    record.merge_status,
                    MergeStatus::Complete | MergeStatus::Pending
                )
            })
            .unwrap_or(false);
        merge_ok && self.next_level(level).is_some()
    }

    /// All levels fully complete.
    pub fn all_levels_complete(&self) -> bool {
        self.graph
            .levels()
            .into_iter()
            .all(|level| self.is_level_fully_complete(level))
    }
}

#[cfg(test)]
#[path = "levels_tests.rs"]
mod tests;
