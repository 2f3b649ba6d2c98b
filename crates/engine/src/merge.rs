// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-of-level merge protocol.
//!
//! Worker branches converge into the mainline only here. Two branches
//! touching the same file is a file-ownership violation upstream, so the
//! flow fails loudly before merging anything. Gate failure rolls the
//! mainline back to its pre-merge commit.

use crate::gates::GatePipeline;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{error, info, warn};
use zerg_adapters::{GitError, GitOps};
use zerg_core::{GateRunResult, QualityGate};

/// Outcome of one level merge attempt.
#[derive(Debug, Clone, Serialize)]
pub struct MergeFlowResult {
    pub success: bool,
    pub level: u32,
    pub source_branches: Vec<String>,
    pub target_branch: String,
    pub merge_commit: Option<String>,
    pub error: Option<String>,
    /// True when the failure was a merge conflict (intervention required).
    pub conflict: bool,
    pub gate_results: Vec<GateRunResult>,
}

impl MergeFlowResult {
    fn base(level: u32, branches: &[String], target: &str) -> Self {
        Self {
            success: false,
            level,
            source_branches: branches.to_vec(),
            target_branch: target.to_string(),
            merge_commit: None,
            error: None,
            conflict: false,
            gate_results: Vec::new(),
        }
    }
}

/// Merges worker branches into the mainline at level boundaries.
pub struct MergeCoordinator {
    repo_root: PathBuf,
    target_branch: String,
}

impl MergeCoordinator {
    pub fn new(repo_root: impl Into<PathBuf>, target_branch: impl Into<String>) -> Self {
        Self {
            repo_root: repo_root.into(),
            target_branch: target_branch.into(),
        }
    }

    pub fn target_branch(&self) -> &str {
        &self.target_branch
    }

    /// Execute the full merge protocol for a level.
    pub async fn full_merge_flow(
        &self,
        level: u32,
        worker_branches: Vec<String>,
        gate_pipeline: &GatePipeline,
        gates: &[QualityGate],
        skip_gates: bool,
        skip_tests: bool,
    ) -> MergeFlowResult {
        let mut result = MergeFlowResult::base(level, &worker_branches, &self.target_branch);
        let git = GitOps::new(&self.repo_root);

        if worker_branches.is_empty() {
            warn!(level, "no worker branches to merge");
            result.success = true;
            return result;
        }

        // The mainline checkout must be on the target branch with a clean
        // tree; anything else means something diverged externally.
        match git.current_branch().await {
            Ok(branch) if branch == self.target_branch => {}
            Ok(branch) => {
                result.error = Some(format!(
                    "mainline checkout is on '{branch}', expected '{}'",
                    self.target_branch
                ));
                return result;
            }
            Err(err) => {
                result.error = Some(err.to_string());
                return result;
            }
        }
        match git.has_changes().await {
            Ok(false) => {}
            Ok(true) => {
                result.error = Some("mainline working tree is dirty".into());
                return result;
            }
            Err(err) => {
                result.error = Some(err.to_string());
                return result;
            }
        }

        // Filter to branches that actually exist (a worker may never have
        // committed)
        let mut branches = Vec::new();
        for branch in &worker_branches {
            if git.branch_exists(branch).await {
                branches.push(branch.clone());
            }
        }
        if branches.is_empty() {
            result.success = true;
            return result;
        }

        // Ownership pre-check: any file changed on two branches fails the
        // whole merge before touching the mainline.
        let mut owners: HashMap<String, String> = HashMap::new();
        for branch in &branches {
            let files = match git.changed_files(&self.target_branch, branch).await {
                Ok(files) => files,
                Err(err) => {
                    result.error = Some(err.to_string());
                    return result;
                }
            };
            for file in files {
                if let Some(previous) = owners.insert(file.clone(), branch.clone()) {
                    error!(
                        level,
                        file,
                        first = %previous,
                        second = %branch,
                        "file changed on two worker branches",
                    );
                    result.error = Some(format!(
                        "file ownership violation: '{file}' changed on both '{previous}' and '{branch}'"
                    ));
                    result.conflict = true;
                    return result;
                }
            }
        }

        let pre_merge = match git.current_commit().await {
            Ok(commit) => commit,
            Err(err) => {
                result.error = Some(err.to_string());
                return result;
            }
        };

        info!(level, branches = branches.len(), "merging worker branches");
        for branch in &branches {
            let message = format!("merge level {level}: {branch}");
            match git.merge(branch, &message).await {
                Ok(commit) => {
                    info!(level, branch = %branch, commit = %commit, "branch merged");
                }
                Err(GitError::MergeConflict {
                    branch: conflicted,
                    files,
                }) => {
                    error!(level, branch = %conflicted, ?files, "merge conflict; rolling back");
                    if let Err(err) = git.reset_hard(&pre_merge).await {
                        warn!(error = %err, "rollback after conflict failed");
                    }
                    result.error = Some(format!(
                        "merge conflict on '{conflicted}': {}",
                        files.join(", ")
                    ));
                    result.conflict = true;
                    return result;
                }
                Err(err) => {
                    if let Err(rollback_err) = git.reset_hard(&pre_merge).await {
                        warn!(error = %rollback_err, "rollback after merge failure failed");
                    }
                    result.error = Some(err.to_string());
                    return result;
                }
            }
        }

        // Quality gates guard the merged result
        if !skip_gates && !gates.is_empty() {
            let gate_results = gate_pipeline
                .run_gates_for_level(level, gates, &self.repo_root, skip_tests)
                .await;
            let passed = GatePipeline::required_passed(gates, &gate_results);
            result.gate_results = gate_results;
            if !passed {
                error!(level, "required gate failed on merged result; rolling back");
                if let Err(err) = git.reset_hard(&pre_merge).await {
                    warn!(error = %err, "rollback after gate failure failed");
                }
                result.error = Some("required quality gate failed after merge".into());
                return result;
            }
        }

        match git.current_commit().await {
            Ok(commit) => {
                result.merge_commit = Some(commit);
                result.success = true;
            }
            Err(err) => {
                result.error = Some(err.to_string());
            }
        }
        result
    }
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
