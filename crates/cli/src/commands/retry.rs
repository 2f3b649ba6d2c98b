// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `zerg retry`: reset failed task(s) to pending.

use super::{repo_root, resolve_feature};
use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use zerg_core::{ExitCode, SystemClock, TaskId, ZergConfig};
use zerg_engine::RetryManager;
use zerg_storage::StateStore;

#[derive(Debug, Args)]
pub struct RetryArgs {
    /// Task to retry
    pub task_id: Option<String>,

    /// Retry every failed task
    #[arg(long, conflicts_with = "task_id")]
    pub all: bool,

    /// Feature name (default: from the task graph)
    #[arg(long, short = 'f')]
    pub feature: Option<String>,
}

pub async fn run(args: RetryArgs) -> Result<i32> {
    let repo_root = repo_root()?;
    let feature = resolve_feature(&repo_root, args.feature)?;
    let config = ZergConfig::load(&repo_root)?;
    let clock = Arc::new(SystemClock);
    let mut store = StateStore::open(&repo_root, &feature, clock.clone())?;
    let manager = RetryManager::new(&config.workers, clock);

    if args.all {
        let reset = manager.retry_all_failed(&mut store)?;
        println!("reset {} failed task(s) to pending", reset.len());
        return Ok(ExitCode::Success.code());
    }

    let Some(task_id) = args.task_id else {
        anyhow::bail!("pass a task id or --all");
    };
    let task_id = TaskId::new(task_id);
    if manager.retry_task(&mut store, &task_id)? {
        println!("task {task_id} reset to pending");
        Ok(ExitCode::Success.code())
    } else {
        anyhow::bail!("task {task_id} is not in a failed state");
    }
}
