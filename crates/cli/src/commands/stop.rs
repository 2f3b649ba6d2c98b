// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `zerg stop`: terminate a running orchestration.
//!
//! The feature lock records the orchestrator's pid. A plain stop sends
//! SIGINT so the orchestrator's interrupt path shuts workers down
//! gracefully; `--force` sends SIGKILL and reclaims the lock.

use super::{repo_root, resolve_feature};
use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use zerg_core::{ExitCode, SystemClock};
use zerg_storage::Lockfile;

#[derive(Debug, Args)]
pub struct StopArgs {
    /// Feature name (default: from the task graph)
    #[arg(long, short = 'f')]
    pub feature: Option<String>,

    /// Kill the orchestrator instead of interrupting it
    #[arg(long)]
    pub force: bool,
}

pub async fn run(args: StopArgs) -> Result<i32> {
    let repo_root = repo_root()?;
    let feature = resolve_feature(&repo_root, args.feature)?;
    let lock = Lockfile::new(
        repo_root.join(".zerg/locks").join(format!("{feature}.lock")),
        Arc::new(SystemClock),
    );

    let Some(pid) = lock.check() else {
        println!("no active orchestration for feature '{feature}'");
        return Ok(ExitCode::Success.code());
    };

    signal_orchestrator(pid, args.force)?;
    println!(
        "sent {} to orchestrator pid {pid}",
        if args.force { "SIGKILL" } else { "SIGINT" }
    );
    if args.force {
        // The killed process cannot release its own lock
        let _ = std::fs::remove_file(lock.path());
    }
    Ok(ExitCode::Success.code())
}

#[cfg(unix)]
fn signal_orchestrator(pid: u32, force: bool) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let signal = if force { Signal::SIGKILL } else { Signal::SIGINT };
    kill(Pid::from_raw(pid as i32), signal)
        .map_err(|err| anyhow::anyhow!("failed to signal pid {pid}: {err}"))
}

#[cfg(not(unix))]
fn signal_orchestrator(_pid: u32, _force: bool) -> Result<()> {
    anyhow::bail!("stop is only supported on unix hosts")
}
