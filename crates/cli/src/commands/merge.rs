// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `zerg merge <level>`: run the merge protocol for a level manually
//! (used after resolving a conflict, or with deferred merges).

use super::{repo_root, resolve_feature};
use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use zerg_core::{ExitCode, LevelStatus, MergeStatus, SystemClock, ZergConfig};
use zerg_engine::{GatePipeline, MergeCoordinator};
use zerg_storage::StateStore;

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Level to merge
    pub level: u32,

    /// Feature name (default: from the task graph)
    #[arg(long, short = 'f')]
    pub feature: Option<String>,

    /// Skip test gates
    #[arg(long)]
    pub skip_tests: bool,
}

pub async fn run(args: MergeArgs) -> Result<i32> {
    let repo_root = repo_root()?;
    let feature = resolve_feature(&repo_root, args.feature)?;
    let config = ZergConfig::load(&repo_root)?;
    let clock = Arc::new(SystemClock);
    let mut store = StateStore::open(&repo_root, &feature, clock.clone())?;
    store.load()?;

    let branches: Vec<String> = store
        .state()
        .workers
        .values()
        .map(|w| w.branch.clone())
        .collect();
    let merger = MergeCoordinator::new(&repo_root, &config.merge.target_branch);
    let pipeline = GatePipeline::new(
        repo_root.join(&config.verification.artifact_dir),
        config.verification.staleness_threshold_seconds,
        config.verification.stop_on_required_failure,
        clock,
    );

    store.set_level_merge_status(args.level, MergeStatus::Merging)?;
    let result = merger
        .full_merge_flow(
            args.level,
            branches,
            &pipeline,
            &config.quality_gates,
            false,
            args.skip_tests,
        )
        .await;

    if result.success {
        store.set_level_status(args.level, LevelStatus::Complete, result.merge_commit.clone())?;
        store.set_level_merge_status(args.level, MergeStatus::Complete)?;
        println!(
            "level {} merged into {} at {}",
            args.level,
            result.target_branch,
            result.merge_commit.as_deref().unwrap_or("(no commit)")
        );
        Ok(ExitCode::Success.code())
    } else {
        let status = if result.conflict {
            MergeStatus::Conflict
        } else {
            MergeStatus::Failed
        };
        store.set_level_merge_status(args.level, status)?;
        anyhow::bail!(
            "merge failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
}
