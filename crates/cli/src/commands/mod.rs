// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI subcommand implementations

pub mod cleanup;
pub mod logs;
pub mod merge;
pub mod retry;
pub mod rush;
pub mod status;
pub mod stop;
pub mod worker;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default task graph location.
pub const TASK_GRAPH_PATH: &str = ".gsd/tasks/task-graph.json";

/// Resolve the feature name: explicit flag wins, else the task graph's
/// `feature` field.
pub fn resolve_feature(repo_root: &Path, explicit: Option<String>) -> Result<String> {
    if let Some(feature) = explicit {
        return Ok(feature);
    }
    let graph_path = repo_root.join(TASK_GRAPH_PATH);
    let text = std::fs::read_to_string(&graph_path).with_context(|| {
        format!(
            "no --feature given and no task graph at {}",
            graph_path.display()
        )
    })?;
    let doc: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("task graph at {} is not valid JSON", graph_path.display()))?;
    doc.get("feature")
        .and_then(|f| f.as_str())
        .map(str::to_string)
        .context("task graph has no 'feature' field")
}

/// The repository root is the working directory.
pub fn repo_root() -> Result<PathBuf> {
    std::env::current_dir().context("cannot determine working directory")
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
