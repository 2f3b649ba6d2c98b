// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `zerg cleanup`: remove worktrees, stale locks, and orphan containers.

use super::{repo_root, resolve_feature};
use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use zerg_adapters::{docker_available, ContainerLauncher, LauncherConfig, WorktreeManager};
use zerg_core::{Clock, ExitCode, SystemClock, ZergConfig};

#[derive(Debug, Args)]
pub struct CleanupArgs {
    /// Feature name (default: from the task graph)
    #[arg(long, short = 'f')]
    pub feature: Option<String>,
}

pub async fn run(args: CleanupArgs) -> Result<i32> {
    let repo_root = repo_root()?;
    let feature = resolve_feature(&repo_root, args.feature)?;
    let config = ZergConfig::load(&repo_root)?;

    // Worker worktrees
    let worktrees = WorktreeManager::new(&repo_root, &config.merge.target_branch);
    let mut removed = 0;
    for path in worktrees.list(&feature).await? {
        worktrees.delete(&path, false).await?;
        removed += 1;
    }
    println!("removed {removed} worktree(s) for feature '{feature}'");

    // Stale feature lock
    let lock_path = repo_root.join(".zerg/locks").join(format!("{feature}.lock"));
    if lock_path.exists() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let lock = zerg_storage::Lockfile::new(lock_path.clone(), clock);
        if lock.check().is_none() {
            std::fs::remove_file(&lock_path)?;
            println!("removed stale lock {}", lock_path.display());
        } else {
            println!("lock {} is still active; leaving it", lock_path.display());
        }
    }

    // Orphan containers, when docker is around
    if docker_available().await {
        let launcher = ContainerLauncher::new(
            LauncherConfig {
                worker_program: "zerg".into(),
                worker_args: vec!["worker".into()],
                log_dir: repo_root.join(&config.logging.directory),
                stall_timeout: std::time::Duration::from_secs(
                    config.heartbeat.stall_timeout_seconds,
                ),
                stall_cooldown: std::time::Duration::from_secs(
                    config.heartbeat.stall_cooldown_seconds,
                ),
            },
            config.resources.container_image.clone(),
            config.resources.container_memory_limit.clone(),
            config.resources.container_cpu_limit,
            repo_root.clone(),
        );
        launcher.cleanup_orphans(&feature).await;
    }

    Ok(ExitCode::Success.code())
}
