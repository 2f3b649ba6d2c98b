// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-worker git worktrees.
//!
//! Worker `i` of feature `f` gets branch `zerg/{f}/worker-{i}` checked out
//! at `.zerg/worktrees/{f}/worker-{i}`, rooted off the mainline. Create is
//! idempotent; delete is best-effort unless strict.

use crate::git::{GitError, GitOps};
use crate::subprocess::{run_with_timeout, GIT_TIMEOUT};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::warn;

#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("worktree {operation} failed for {path}: {message}")]
    Operation {
        operation: String,
        path: String,
        message: String,
    },
}

/// A created worktree: where it lives and which branch it tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: String,
}

/// Manages per-worker worktrees over a shared repository.
#[derive(Debug, Clone)]
pub struct WorktreeManager {
    repo_root: PathBuf,
    base_branch: String,
}

impl WorktreeManager {
    pub fn new(repo_root: impl Into<PathBuf>, base_branch: impl Into<String>) -> Self {
        Self {
            repo_root: repo_root.into(),
            base_branch: base_branch.into(),
        }
    }

    pub fn branch_name(feature: &str, worker_id: u32) -> String {
        format!("zerg/{feature}/worker-{worker_id}")
    }

    pub fn worktree_path(&self, feature: &str, worker_id: u32) -> PathBuf {
        self.repo_root
            .join(".zerg/worktrees")
            .join(feature)
            .join(format!("worker-{worker_id}"))
    }

    async fn git(&self, args: &[&str]) -> Result<String, WorktreeError> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.repo_root);
        let description = format!("git {}", args.join(" "));
        let output = run_with_timeout(cmd, GIT_TIMEOUT, &description)
            .await
            .map_err(|message| WorktreeError::Operation {
                operation: args.first().unwrap_or(&"?").to_string(),
                path: self.repo_root.display().to_string(),
                message,
            })?;
        if !output.status.success() {
            return Err(WorktreeError::Operation {
                operation: args.join(" "),
                path: self.repo_root.display().to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Create the worker's worktree and branch. Returns the existing
    /// worktree when it is already present.
    pub async fn create(
        &self,
        feature: &str,
        worker_id: u32,
    ) -> Result<WorktreeInfo, WorktreeError> {
        let path = self.worktree_path(feature, worker_id);
        let branch = Self::branch_name(feature, worker_id);

        if path.exists() {
            return Ok(WorktreeInfo { path, branch });
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| WorktreeError::Operation {
                operation: "mkdir".into(),
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
        }

        let path_str = path.display().to_string();
        self.git(&[
            "worktree",
            "add",
            "-B",
            &branch,
            &path_str,
            &self.base_branch,
        ])
        .await?;

        Ok(WorktreeInfo { path, branch })
    }

    /// Remove a worktree. Failures are logged and swallowed unless
    /// `strict`.
    pub async fn delete(&self, path: &Path, strict: bool) -> Result<(), WorktreeError> {
        let path_str = path.display().to_string();
        let result = self.git(&["worktree", "remove", "--force", &path_str]).await;
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                // Fall back to removing the directory and pruning metadata
                if path.exists() {
                    let _ = std::fs::remove_dir_all(path);
                }
                let _ = self.git(&["worktree", "prune"]).await;
                if strict {
                    Err(err)
                } else {
                    warn!(path = %path_str, error = %err, "worktree delete fell back to prune");
                    Ok(())
                }
            }
        }
    }

    /// Rebase the worktree's branch onto an updated mainline commit.
    /// Returns whether the rebase applied cleanly.
    pub async fn rebase(&self, path: &Path, onto: &str) -> Result<bool, WorktreeError> {
        let git = GitOps::new(path);
        Ok(git.rebase_onto(onto).await?)
    }

    /// All worktree paths currently registered for the feature.
    pub async fn list(&self, feature: &str) -> Result<Vec<PathBuf>, WorktreeError> {
        let output = self.git(&["worktree", "list", "--porcelain"]).await?;
        let needle = format!(".zerg/worktrees/{feature}/");
        Ok(output
            .lines()
            .filter_map(|line| line.strip_prefix("worktree "))
            .filter(|p| p.contains(&needle))
            .map(PathBuf::from)
            .collect())
    }
}

#[cfg(test)]
#[path = "worktree_tests.rs"]
mod tests;
