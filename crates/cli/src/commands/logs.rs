// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `zerg logs <worker_id>`: show a worker's captured output.

use super::repo_root;
use anyhow::Result;
use clap::Args;
use zerg_core::{ExitCode, ZergConfig};

#[derive(Debug, Args)]
pub struct LogsArgs {
    /// Worker slot to inspect
    pub worker_id: u32,

    /// Number of trailing lines per stream
    #[arg(short = 'n', long, default_value_t = 50)]
    pub limit: usize,

    /// Show stderr only
    #[arg(long)]
    pub stderr: bool,
}

pub async fn run(args: LogsArgs) -> Result<i32> {
    let repo_root = repo_root()?;
    let config = ZergConfig::load(&repo_root)?;
    let log_dir = repo_root.join(&config.logging.directory).join("workers");

    let streams: &[&str] = if args.stderr {
        &["stderr"]
    } else {
        &["stdout", "stderr"]
    };
    for stream in streams {
        let path = log_dir.join(format!("{}.{stream}.log", args.worker_id));
        if !path.exists() {
            println!("--- {stream}: no log at {} ---", path.display());
            continue;
        }
        let text = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(args.limit);
        println!("--- {stream} ({}) ---", path.display());
        for line in &lines[start..] {
            println!("{line}");
        }
    }
    Ok(ExitCode::Success.code())
}
