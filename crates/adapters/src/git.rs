// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git operations over the git CLI, bound to one working directory.
//!
//! Workers commit on their own branches; only the merge coordinator
//! touches the mainline. All operations are local (no network).

use crate::subprocess::{run_with_timeout, GIT_TIMEOUT};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },
    #[error("git {command}: {message}")]
    Execution { command: String, message: String },
    #[error("merge of '{branch}' conflicts on: {}", files.join(", "))]
    MergeConflict { branch: String, files: Vec<String> },
}

/// Git CLI wrapper for a single checkout.
#[derive(Debug, Clone)]
pub struct GitOps {
    dir: PathBuf,
}

impl GitOps {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) async fn git(&self, args: &[&str]) -> Result<String, GitError> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.dir);
        let description = format!("git {}", args.join(" "));
        let output = run_with_timeout(cmd, GIT_TIMEOUT, &description)
            .await
            .map_err(|message| GitError::Execution {
                command: args.first().unwrap_or(&"?").to_string(),
                message,
            })?;
        if !output.status.success() {
            return Err(GitError::Command {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run git, returning success instead of an error for nonzero exits.
    async fn git_ok(&self, args: &[&str]) -> bool {
        matches!(self.git(args).await, Ok(_))
    }

    pub async fn current_commit(&self) -> Result<String, GitError> {
        self.git(&["rev-parse", "HEAD"]).await
    }

    pub async fn rev_parse(&self, reference: &str) -> Result<String, GitError> {
        self.git(&["rev-parse", reference]).await
    }

    pub async fn current_branch(&self) -> Result<String, GitError> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    /// Any staged or unstaged changes in the working tree.
    pub async fn has_changes(&self) -> Result<bool, GitError> {
        let status = self.git(&["status", "--porcelain"]).await?;
        Ok(!status.is_empty())
    }

    /// Stage (optionally everything) and commit.
    pub async fn commit(&self, message: &str, add_all: bool) -> Result<(), GitError> {
        if add_all {
            self.git(&["add", "-A"]).await?;
        }
        self.git(&["commit", "-m", message]).await?;
        Ok(())
    }

    pub async fn checkout(&self, reference: &str) -> Result<(), GitError> {
        self.git(&["checkout", reference]).await?;
        Ok(())
    }

    pub async fn branch_exists(&self, branch: &str) -> bool {
        self.git_ok(&["rev-parse", "--verify", &format!("refs/heads/{branch}")])
            .await
    }

    /// Whether `ancestor` is an ancestor of `descendant`.
    pub async fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        let mut cmd = Command::new("git");
        cmd.args(["merge-base", "--is-ancestor", ancestor, descendant])
            .current_dir(&self.dir);
        let output = run_with_timeout(cmd, GIT_TIMEOUT, "git merge-base --is-ancestor")
            .await
            .map_err(|message| GitError::Execution {
                command: "merge-base".into(),
                message,
            })?;
        Ok(output.status.success())
    }

    /// Merge `branch` into the current branch with a merge commit.
    ///
    /// On conflict the merge is aborted and the conflicted files are
    /// reported; the working tree is left clean.
    pub async fn merge(&self, branch: &str, message: &str) -> Result<String, GitError> {
        let result = self.git(&["merge", "--no-ff", branch, "-m", message]).await;
        match result {
            Ok(_) => self.current_commit().await,
            Err(err) => {
                let conflicted = self
                    .git(&["diff", "--name-only", "--diff-filter=U"])
                    .await
                    .unwrap_or_default();
                let files: Vec<String> = conflicted
                    .lines()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
                let _ = self.git(&["merge", "--abort"]).await;
                if files.is_empty() {
                    Err(err)
                } else {
                    Err(GitError::MergeConflict {
                        branch: branch.to_string(),
                        files,
                    })
                }
            }
        }
    }

    /// Hard-reset the current branch (merge rollback).
    pub async fn reset_hard(&self, commit: &str) -> Result<(), GitError> {
        self.git(&["reset", "--hard", commit]).await?;
        Ok(())
    }

    /// Rebase the current branch onto `target`. Returns `false` (after
    /// aborting) when the rebase hits conflicts.
    pub async fn rebase_onto(&self, target: &str) -> Result<bool, GitError> {
        match self.git(&["rebase", target]).await {
            Ok(_) => Ok(true),
            Err(_) => {
                let _ = self.git(&["rebase", "--abort"]).await;
                Ok(false)
            }
        }
    }

    /// Files changed on `branch` relative to the merge base with `base`.
    pub async fn changed_files(&self, base: &str, branch: &str) -> Result<Vec<String>, GitError> {
        let range = format!("{base}...{branch}");
        let diff = self.git(&["diff", "--name-only", &range]).await?;
        Ok(diff
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
