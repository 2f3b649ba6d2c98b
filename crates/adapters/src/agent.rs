// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LLM agent CLI invocation.
//!
//! The agent is an opaque command: it consumes a prompt argument, may
//! mutate files in its working directory, and exits 0 on success. A soft
//! timeout sends SIGTERM to the agent's process group; SIGKILL follows
//! after a short grace period.

use crate::subprocess::TERMINATE_GRACE;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent command '{command}' could not be started: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("agent wait failed: {0}")]
    Wait(#[from] std::io::Error),
}

/// Outcome of one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRunResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

/// Runs the configured LLM CLI for a task.
#[derive(Debug, Clone)]
pub struct AgentInvoker {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl AgentInvoker {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Invoke the agent with `prompt` appended as the final argument.
    pub async fn invoke(
        &self,
        prompt: &str,
        cwd: &Path,
        env: &[(String, String)],
    ) -> Result<AgentRunResult, AgentError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg(prompt)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(command = %self.command, cwd = %cwd.display(), "invoking agent");
        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| AgentError::Spawn {
            command: self.command.clone(),
            source,
        })?;
        let pid = child.id();

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stdout_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let mut timed_out = false;
        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                timed_out = true;
                warn!(
                    command = %self.command,
                    timeout_secs = self.timeout.as_secs(),
                    "agent soft timeout; sending SIGTERM",
                );
                terminate_group(pid, false);
                match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!(command = %self.command, "agent ignored SIGTERM; killing");
                        terminate_group(pid, true);
                        child.wait().await?
                    }
                }
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = status.code().unwrap_or(-1);
        let success = status.success() && !timed_out;

        info!(
            command = %self.command,
            exit_code,
            duration_ms,
            timed_out,
            "agent finished",
        );

        Ok(AgentRunResult {
            success,
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            duration_ms,
            timed_out,
        })
    }
}

/// Signal a child's process group (unix); no-op elsewhere.
fn terminate_group(pid: Option<u32>, force: bool) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        if let Some(pid) = pid {
            let group = Pid::from_raw(-(pid as i32));
            let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
            if let Err(err) = kill(group, signal) {
                warn!(pid, ?signal, error = %err, "failed to signal process group");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (pid, force);
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
