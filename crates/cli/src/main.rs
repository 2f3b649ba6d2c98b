// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zerg - Parallel code-generation orchestration CLI

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{cleanup, logs, merge, retry, rush, status, stop, worker};
use zerg_core::{BehavioralMode, DepthTier, ExitCode};
use zerg_engine::CliFlags;

#[derive(Parser)]
#[command(
    name = "zerg",
    version,
    about = "ZERG - Overwhelm features with coordinated parallel workers"
)]
struct Cli {
    /// Quick surface-level analysis
    #[arg(long, global = true)]
    quick: bool,

    /// Structured multi-step analysis
    #[arg(long, global = true)]
    think: bool,

    /// Deep architectural analysis
    #[arg(long = "think-hard", global = true)]
    think_hard: bool,

    /// Maximum depth analysis
    #[arg(long, global = true)]
    ultrathink: bool,

    /// Behavioral execution mode
    #[arg(long, global = true, value_parser = parse_mode)]
    mode: Option<BehavioralMode>,

    /// Disable compact output (compact is on by default)
    #[arg(long = "no-compact", global = true)]
    no_compact: bool,

    /// Enable TDD enforcement mode
    #[arg(long, global = true)]
    tdd: bool,

    /// Disable improvement loops (loops are on by default)
    #[arg(long = "no-loop", global = true)]
    no_loop: bool,

    /// Override max loop iterations
    #[arg(long, global = true)]
    iterations: Option<u32>,

    /// Disable MCP auto-routing
    #[arg(long = "no-mcp", global = true)]
    no_mcp: bool,

    #[command(subcommand)]
    command: Commands,
}

fn parse_mode(s: &str) -> Result<BehavioralMode, String> {
    BehavioralMode::parse(s).ok_or_else(|| {
        format!("unknown mode '{s}' (expected precision, speed, exploration, refactor, debug)")
    })
}

#[derive(Subcommand)]
enum Commands {
    /// Start orchestration for a feature
    Rush(rush::RushArgs),
    /// Render the current state snapshot
    Status(status::StatusArgs),
    /// Terminate a running orchestration
    Stop(stop::StopArgs),
    /// Reset failed task(s) to pending
    Retry(retry::RetryArgs),
    /// Run the merge protocol for a level
    Merge(merge::MergeArgs),
    /// Show a worker's logs
    Logs(logs::LogsArgs),
    /// Remove worktrees, stale locks, and released state
    Cleanup(cleanup::CleanupArgs),
    /// Worker protocol entry point (spawned by the orchestrator)
    #[command(hide = true)]
    Worker,
}

impl Cli {
    /// Depth flags are mutually exclusive.
    fn depth(&self) -> Result<Option<DepthTier>> {
        let flags = [
            (self.quick, DepthTier::Quick),
            (self.think, DepthTier::Think),
            (self.think_hard, DepthTier::ThinkHard),
            (self.ultrathink, DepthTier::Ultrathink),
        ];
        let active: Vec<DepthTier> = flags
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, tier)| *tier)
            .collect();
        if active.len() > 1 {
            anyhow::bail!(
                "depth flags are mutually exclusive: --quick, --think, --think-hard, --ultrathink"
            );
        }
        Ok(active.first().copied())
    }

    fn flags(&self) -> Result<CliFlags> {
        Ok(CliFlags {
            depth: self.depth()?,
            mode: self.mode,
            no_compact: self.no_compact,
            tdd: self.tdd,
            no_loop: self.no_loop,
            iterations: self.iterations,
            mcp: if self.no_mcp { Some(false) } else { None },
        })
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::Error.code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let flags = cli.flags()?;
    match cli.command {
        Commands::Rush(args) => rush::run(args, &flags).await,
        Commands::Status(args) => status::run(args).await,
        Commands::Stop(args) => stop::run(args).await,
        Commands::Retry(args) => retry::run(args).await,
        Commands::Merge(args) => merge::run(args).await,
        Commands::Logs(args) => logs::run(args).await,
        Commands::Cleanup(args) => cleanup::run(args).await,
        Commands::Worker => worker::run().await,
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
