// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `zerg status`: render the state snapshot.

use super::{repo_root, resolve_feature};
use crate::output;
use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use zerg_core::{ExitCode, SystemClock};
use zerg_storage::StateStore;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Feature name (default: from the task graph)
    #[arg(long, short = 'f')]
    pub feature: Option<String>,

    /// Emit raw JSON instead of the table view
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: StatusArgs) -> Result<i32> {
    let repo_root = repo_root()?;
    let feature = resolve_feature(&repo_root, args.feature)?;
    let mut store = StateStore::open(&repo_root, &feature, Arc::new(SystemClock))?;
    store.load()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(store.state())?);
    } else {
        print!("{}", output::render_status(store.state()));
    }
    Ok(ExitCode::Success.code())
}
