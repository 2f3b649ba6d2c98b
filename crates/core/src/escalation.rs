// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker escalations: reports of ambiguous situations a worker cannot
//! resolve on its own. The monitor surfaces unresolved entries to the
//! operator.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why a worker escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationCategory {
    AmbiguousSpec,
    DependencyMissing,
    VerificationUnclear,
    Unknown,
}

impl std::fmt::Display for EscalationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EscalationCategory::AmbiguousSpec => "ambiguous_spec",
            EscalationCategory::DependencyMissing => "dependency_missing",
            EscalationCategory::VerificationUnclear => "verification_unclear",
            EscalationCategory::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Single escalation record from a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub worker_id: u32,
    pub task_id: TaskId,
    /// Epoch milliseconds when the escalation was raised.
    pub timestamp_ms: u64,
    #[serde(default = "default_category")]
    pub category: EscalationCategory,
    pub message: String,
    #[serde(default)]
    pub context: HashMap<String, String>,
    #[serde(default)]
    pub resolved: bool,
}

fn default_category() -> EscalationCategory {
    EscalationCategory::Unknown
}

impl Escalation {
    /// Terminal alert rendering for the orchestrator console.
    pub fn render_alert(&self) -> String {
        let rule = "=".repeat(60);
        format!(
            "\n{rule}\nESCALATION from Worker {}\nTask: {} | Category: {}\n{}\n{rule}\n",
            self.worker_id, self.task_id, self.category, self.message
        )
    }
}

#[cfg(test)]
#[path = "escalation_tests.rs"]
mod tests;
