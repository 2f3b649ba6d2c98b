// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-feature metrics rollup computed from task records.

use crate::store::FeatureState;
use serde::{Deserialize, Serialize};
use zerg_core::TaskStatus;

/// Aggregate task metrics stored in the snapshot after each level merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMetrics {
    pub tasks_total: u32,
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub tasks_in_progress: u32,
    pub total_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_duration_ms: Option<u64>,
}

impl FeatureMetrics {
    pub fn compute(state: &FeatureState) -> Self {
        let mut metrics = FeatureMetrics {
            tasks_total: state.tasks.len() as u32,
            ..Self::default()
        };
        let mut timed = 0u64;
        for record in state.tasks.values() {
            match record.status() {
                TaskStatus::Complete => metrics.tasks_completed += 1,
                TaskStatus::Failed => metrics.tasks_failed += 1,
                TaskStatus::InProgress => metrics.tasks_in_progress += 1,
                _ => {}
            }
            if let Some(duration) = record.duration_ms {
                metrics.total_duration_ms += duration;
                timed += 1;
            }
        }
        if timed > 0 {
            metrics.mean_duration_ms = Some(metrics.total_duration_ms / timed);
        }
        metrics
    }

    pub fn progress_percent(&self) -> f64 {
        if self.tasks_total == 0 {
            return 100.0;
        }
        f64::from(self.tasks_completed) * 100.0 / f64::from(self.tasks_total)
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
