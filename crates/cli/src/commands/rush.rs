// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `zerg rush`: start orchestration.

use super::{repo_root, resolve_feature, TASK_GRAPH_PATH};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use zerg_adapters::LauncherMode;
use zerg_core::{ExitCode, SystemClock, ZergConfig};
use zerg_engine::{CapabilityResolver, CliFlags, Orchestrator, OrchestratorOptions};
use zerg_graph::TaskGraph;
use zerg_storage::{validate_feature_name, Lockfile};

#[derive(Debug, Args)]
pub struct RushArgs {
    /// Number of workers to spawn
    #[arg(long, short = 'w', default_value_t = 5)]
    pub workers: u32,

    /// Feature name (default: from the task graph)
    #[arg(long, short = 'f')]
    pub feature: Option<String>,

    /// Starting level
    #[arg(long, short = 'l')]
    pub level: Option<u32>,

    /// Print the execution plan without spawning workers
    #[arg(long)]
    pub dry_run: bool,

    /// Resume a paused or recoverable run
    #[arg(long)]
    pub resume: bool,

    /// Worker execution backend
    #[arg(long, default_value = "auto", value_parser = parse_launcher_mode)]
    pub mode: LauncherMode,

    /// Skip test gates until the final level
    #[arg(long)]
    pub skip_tests: bool,

    /// Task graph path
    #[arg(long, default_value = TASK_GRAPH_PATH)]
    pub task_graph: PathBuf,
}

fn parse_launcher_mode(s: &str) -> Result<LauncherMode, String> {
    LauncherMode::parse(s).map_err(|e| e.to_string())
}

pub async fn run(args: RushArgs, flags: &CliFlags) -> Result<i32> {
    let repo_root = repo_root()?;
    let feature = resolve_feature(&repo_root, args.feature.clone())?;
    validate_feature_name(&feature)?;

    let task_graph_path = if args.task_graph.is_absolute() {
        args.task_graph.clone()
    } else {
        repo_root.join(&args.task_graph)
    };
    let graph = TaskGraph::load(&task_graph_path).context("task graph rejected")?;
    let config = ZergConfig::load(&repo_root)?;
    let capabilities = CapabilityResolver.resolve(flags, &config, Some(&graph), "rush");

    // One orchestrator per feature: advisory lock with pid:epoch content
    let lock = Lockfile::new(
        repo_root.join(".zerg/locks").join(format!("{feature}.lock")),
        Arc::new(SystemClock),
    );
    if !lock.try_acquire()? {
        let holder = lock.check().map(|pid| pid.to_string()).unwrap_or_default();
        anyhow::bail!("feature '{feature}' is already being orchestrated (pid {holder})");
    }

    let result = run_locked(args, repo_root, feature, task_graph_path, capabilities).await;
    lock.release();
    result
}

async fn run_locked(
    args: RushArgs,
    repo_root: PathBuf,
    feature: String,
    task_graph_path: PathBuf,
    capabilities: zerg_core::ResolvedCapabilities,
) -> Result<i32> {
    let options = OrchestratorOptions {
        repo_root,
        feature,
        task_graph_path,
        worker_count: args.workers,
        start_level: args.level,
        dry_run: args.dry_run,
        resume: args.resume,
        mode: args.mode,
        skip_tests: args.skip_tests,
        capabilities,
    };
    let mut orchestrator = Orchestrator::new(options).await?;

    if args.dry_run {
        orchestrator.start().await?;
        println!("{}", orchestrator.plan());
        return Ok(ExitCode::Success.code());
    }

    // Interrupt triggers a graceful stop and the conventional 130
    tokio::select! {
        result = orchestrator.start() => {
            result?;
            info!("orchestration finished");
            Ok(ExitCode::Success.code())
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; shutting down workers");
            orchestrator.stop(false).await?;
            Ok(ExitCode::Interrupt.code())
        }
    }
}
