// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task execution pipeline inside a worker.
//!
//! One task flows through: agent invocation → verification (retried with
//! the same command) → commit on the worker branch with a HEAD-moved
//! check. The handler reports a structured outcome; status transitions
//! stay with the protocol state machine.

use crate::error::EngineError;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};
use zerg_adapters::{run_with_timeout, AgentInvoker, GitOps};
use zerg_core::{truncate_output, Event, Task};
use zerg_storage::StateStore;

/// What happened to a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success,
    Failed(String),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success)
    }
}

/// Executes one task at a time in the worker's worktree.
pub struct TaskExecutor {
    worker_id: u32,
    branch: String,
    worktree: PathBuf,
    invoker: AgentInvoker,
    git: GitOps,
    verification_retries: u32,
    /// Extra context prepended to every prompt (feature spec excerpt).
    spec_context: String,
}

impl TaskExecutor {
    pub fn new(
        worker_id: u32,
        branch: String,
        worktree: PathBuf,
        invoker: AgentInvoker,
        verification_retries: u32,
        spec_context: String,
    ) -> Self {
        let git = GitOps::new(&worktree);
        Self {
            worker_id,
            branch,
            worktree,
            invoker,
            git,
            verification_retries,
            spec_context,
        }
    }

    /// Run the full pipeline for one claimed task. Returns the agent
    /// output size so the protocol can track context usage.
    pub async fn execute(
        &self,
        store: &mut StateStore,
        task: &Task,
    ) -> Result<(ExecutionOutcome, usize), EngineError> {
        let prompt = self.build_prompt(task);
        info!(task_id = %task.id, worker_id = self.worker_id, "executing task");

        let agent_env = vec![
            ("ZERG_TASK_ID".to_string(), task.id.to_string()),
            ("ZERG_WORKER_ID".to_string(), self.worker_id.to_string()),
        ];
        let agent = self
            .invoker
            .invoke(&prompt, &self.worktree, &agent_env)
            .await?;
        let output_bytes = agent.stdout.len() + agent.stderr.len();

        if !agent.success {
            error!(
                task_id = %task.id,
                exit_code = agent.exit_code,
                timed_out = agent.timed_out,
                "agent invocation failed",
            );
            let reason = if agent.timed_out {
                format!("agent timed out after {}ms", agent.duration_ms)
            } else {
                format!(
                    "agent exited {}: {}",
                    agent.exit_code,
                    truncate_output(&agent.stderr)
                )
            };
            return Ok((ExecutionOutcome::Failed(reason), output_bytes));
        }

        if let Some(verification) = &task.verification {
            if !self.run_verification(store, task, verification).await? {
                return Ok((
                    ExecutionOutcome::Failed("verification failed".into()),
                    output_bytes,
                ));
            }
        }

        if let Some(reason) = self.commit_changes(store, task).await? {
            return Ok((ExecutionOutcome::Failed(reason), output_bytes));
        }

        Ok((ExecutionOutcome::Success, output_bytes))
    }

    fn build_prompt(&self, task: &Task) -> String {
        let mut prompt = String::new();
        // Task-scoped context from the design phase wins over the broad
        // feature spec
        if let Some(context) = &task.context {
            let _ = writeln!(prompt, "# Task Context (Scoped)");
            let _ = writeln!(prompt, "{context}");
            let _ = writeln!(prompt);
        } else if !self.spec_context.is_empty() {
            let _ = writeln!(prompt, "{}", self.spec_context);
            let _ = writeln!(prompt);
        }

        let _ = writeln!(prompt, "# Task: {}", task.title);
        let _ = writeln!(prompt);
        if !task.description.is_empty() {
            let _ = writeln!(prompt, "## Description");
            let _ = writeln!(prompt, "{}", task.description);
            let _ = writeln!(prompt);
        }
        if task.files.total_count() > 0 {
            let _ = writeln!(prompt, "## Files");
            if !task.files.create.is_empty() {
                let _ = writeln!(prompt, "Create: {}", task.files.create.join(", "));
            }
            if !task.files.modify.is_empty() {
                let _ = writeln!(prompt, "Modify: {}", task.files.modify.join(", "));
            }
            if !task.files.read.is_empty() {
                let _ = writeln!(prompt, "Reference: {}", task.files.read.join(", "));
            }
            let _ = writeln!(prompt);
        }
        if let Some(verification) = &task.verification {
            let _ = writeln!(prompt, "## Verification");
            let _ = writeln!(prompt, "Command: `{}`", verification.command);
            let _ = writeln!(prompt);
        }
        let _ = writeln!(prompt, "## Instructions");
        let _ = writeln!(
            prompt,
            "Implement the task as specified. Make all necessary changes."
        );
        let _ = write!(prompt, "Do NOT commit - the orchestrator handles commits.");
        prompt
    }

    /// Run the verification command, retrying the same command up to the
    /// configured count.
    async fn run_verification(
        &self,
        store: &mut StateStore,
        task: &Task,
        verification: &zerg_core::Verification,
    ) -> Result<bool, EngineError> {
        if verification.command.is_empty() {
            info!(task_id = %task.id, "empty verification command; auto-pass");
            return Ok(true);
        }
        let timeout = Duration::from_secs(verification.timeout_seconds);
        let attempts = self.verification_retries + 1;

        for attempt in 1..=attempts {
            let started = std::time::Instant::now();
            let mut cmd = Command::new("sh");
            cmd.arg("-c")
                .arg(&verification.command)
                .current_dir(&self.worktree);
            let outcome = run_with_timeout(cmd, timeout, "verification").await;

            match outcome {
                Ok(output) if output.status.success() => {
                    store.append_event(Event::VerificationPassed {
                        task_id: task.id.clone(),
                        worker_id: self.worker_id,
                        duration_ms: started.elapsed().as_millis() as u64,
                    })?;
                    info!(task_id = %task.id, attempt, "verification passed");
                    return Ok(true);
                }
                Ok(output) => {
                    let stderr = truncate_output(&String::from_utf8_lossy(&output.stderr));
                    warn!(
                        task_id = %task.id,
                        attempt,
                        exit_code = output.status.code().unwrap_or(-1),
                        "verification failed",
                    );
                    if attempt == attempts {
                        store.append_event(Event::VerificationFailed {
                            task_id: task.id.clone(),
                            worker_id: self.worker_id,
                            exit_code: output.status.code().unwrap_or(-1),
                            stderr,
                        })?;
                    }
                }
                Err(message) => {
                    warn!(task_id = %task.id, attempt, %message, "verification errored");
                    if attempt == attempts {
                        store.append_event(Event::VerificationFailed {
                            task_id: task.id.clone(),
                            worker_id: self.worker_id,
                            exit_code: -1,
                            stderr: truncate_output(&message),
                        })?;
                    }
                }
            }
        }
        Ok(false)
    }

    /// Commit the task's changes. Returns `Some(reason)` on failure; `None`
    /// covers both a clean commit and a legitimately empty change set.
    async fn commit_changes(
        &self,
        store: &mut StateStore,
        task: &Task,
    ) -> Result<Option<String>, EngineError> {
        if !self.git.has_changes().await? {
            info!(task_id = %task.id, "no changes to commit");
            return Ok(None);
        }

        let head_before = self.git.current_commit().await?;
        let message = format!(
            "ZERG [{}]: {}\n\nTask-ID: {}",
            self.worker_id, task.title, task.id
        );
        self.git.commit(&message, true).await?;

        let head_after = self.git.current_commit().await?;
        if head_before == head_after {
            error!(task_id = %task.id, "commit reported success but HEAD did not move");
            return Ok(Some("commit succeeded but HEAD unchanged".into()));
        }

        store.append_event(Event::TaskCommitted {
            task_id: task.id.clone(),
            worker_id: self.worker_id,
            branch: self.branch.clone(),
            commit: head_after.clone(),
        })?;
        info!(task_id = %task.id, commit = %head_after, "task committed");
        Ok(None)
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
