// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable `STATE.md` projection of the snapshot. Non-authoritative.

use crate::metrics::FeatureMetrics;
use crate::store::FeatureState;
use std::fmt::Write as _;

/// Render the snapshot as markdown.
pub fn render(state: &FeatureState) -> String {
    let mut out = String::new();
    let metrics = state
        .metrics
        .clone()
        .unwrap_or_else(|| FeatureMetrics::compute(state));

    let _ = writeln!(out, "# ZERG State: {}", state.feature);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "- Current level: {}",
        if state.current_level == 0 {
            "not started".to_string()
        } else {
            state.current_level.to_string()
        }
    );
    let _ = writeln!(
        out,
        "- Progress: {}/{} complete ({:.0}%), {} failed, {} in progress",
        metrics.tasks_completed,
        metrics.tasks_total,
        metrics.progress_percent(),
        metrics.tasks_failed,
        metrics.tasks_in_progress,
    );
    if state.paused {
        let _ = writeln!(out, "- **PAUSED**");
    }
    if let Some(error) = &state.error {
        let _ = writeln!(out, "- Error: {error}");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Levels");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Level | Status | Merge | Done | Failed | Total |");
    let _ = writeln!(out, "|---|---|---|---|---|---|");
    for level in state.levels.values() {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} |",
            level.number,
            level.status,
            level.merge_status,
            level.completed_tasks,
            level.failed_tasks,
            level.total_tasks,
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Workers");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Worker | Status | Current task | Completed | Branch |");
    let _ = writeln!(out, "|---|---|---|---|---|");
    for worker in state.workers.values() {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            worker.worker_id,
            worker.status,
            worker
                .current_task
                .as_ref()
                .map(|t| t.as_str())
                .unwrap_or("-"),
            worker.tasks_completed,
            worker.branch,
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Tasks");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Task | Level | Status | Worker | Retries | Error |");
    let _ = writeln!(out, "|---|---|---|---|---|---|");
    for (id, record) in &state.tasks {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} |",
            id,
            record.level,
            record.status(),
            record
                .worker_id
                .map(|w| w.to_string())
                .unwrap_or_else(|| "-".into()),
            record.retry_count,
            record.last_error.as_deref().unwrap_or("-"),
        );
    }

    out
}

#[cfg(test)]
#[path = "state_md_tests.rs"]
mod tests;
