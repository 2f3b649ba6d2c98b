// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal rendering for the status command.

use std::fmt::Write as _;
use zerg_storage::{FeatureMetrics, FeatureState};

/// Render the snapshot as a compact terminal view.
pub fn render_status(state: &FeatureState) -> String {
    let metrics = FeatureMetrics::compute(state);
    let mut out = String::new();

    let _ = writeln!(out, "Feature: {}", state.feature);
    let _ = writeln!(
        out,
        "Progress: {}/{} complete ({:.0}%), {} failed, {} in progress",
        metrics.tasks_completed,
        metrics.tasks_total,
        metrics.progress_percent(),
        metrics.tasks_failed,
        metrics.tasks_in_progress,
    );
    let _ = writeln!(
        out,
        "Current level: {}",
        if state.current_level == 0 {
            "not started".to_string()
        } else {
            state.current_level.to_string()
        }
    );
    if state.paused {
        let _ = writeln!(out, "Status: PAUSED");
    }
    if let Some(error) = &state.error {
        let _ = writeln!(out, "Error: {error}");
    }
    if state.is_complete() {
        let _ = writeln!(out, "Status: COMPLETE");
    }

    if !state.levels.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Levels:");
        for level in state.levels.values() {
            let _ = writeln!(
                out,
                "  {} {:<8} merge={:<9} {}/{} done, {} failed",
                level.number,
                level.status.to_string(),
                level.merge_status.to_string(),
                level.completed_tasks,
                level.total_tasks,
                level.failed_tasks,
            );
        }
    }

    if !state.workers.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Workers:");
        for worker in state.workers.values() {
            let _ = writeln!(
                out,
                "  {} {:<13} task={} completed={}",
                worker.worker_id,
                worker.status.to_string(),
                worker
                    .current_task
                    .as_ref()
                    .map(|t| t.as_str())
                    .unwrap_or("-"),
                worker.tasks_completed,
            );
        }
    }

    out
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
