// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability resolution: CLI flags + config + task graph heuristics →
//! the flat [`ResolvedCapabilities`] envelope workers receive as env vars.
//!
//! Depth: an explicit CLI flag wins; otherwise every task is auto-routed
//! and the deepest tier wins globally. Mode: explicit flag, else deep
//! tiers imply precision. Loops apply to code-touching commands only.

use tracing::info;
use zerg_core::{BehavioralMode, DepthTier, ResolvedCapabilities, ZergConfig};
use zerg_graph::TaskGraph;

/// Commands where improvement loops apply.
const LOOP_COMMANDS: &[&str] = &[
    "rush", "refactor", "test", "security", "build", "review", "analyze",
];

/// Global CLI flags feeding capability resolution.
#[derive(Debug, Clone, Default)]
pub struct CliFlags {
    /// Explicit depth tier (`--quick` .. `--ultrathink`).
    pub depth: Option<DepthTier>,
    pub mode: Option<BehavioralMode>,
    /// Compact output is on unless `--no-compact`.
    pub no_compact: bool,
    pub tdd: bool,
    /// Loops are on unless `--no-loop`.
    pub no_loop: bool,
    pub iterations: Option<u32>,
    /// `--mcp` / `--no-mcp` override for MCP routing.
    pub mcp: Option<bool>,
}

/// Resolves the capability envelope for a run.
#[derive(Debug, Default)]
pub struct CapabilityResolver;

impl CapabilityResolver {
    pub fn resolve(
        &self,
        flags: &CliFlags,
        config: &ZergConfig,
        graph: Option<&TaskGraph>,
        command: &str,
    ) -> ResolvedCapabilities {
        let depth_tier = match flags.depth {
            Some(explicit) => explicit,
            None => Self::deepest_task_tier(graph),
        };

        let mode = match flags.mode {
            Some(explicit) => explicit,
            // Deep analysis implies precision; that is also the default
            None => BehavioralMode::Precision,
        };

        let mcp_enabled = flags.mcp.unwrap_or(true);
        let mcp_hint = if mcp_enabled {
            depth_tier.mcp_servers().join(",")
        } else {
            String::new()
        };

        let is_code_command = LOOP_COMMANDS.contains(&command);
        let loop_enabled = !flags.no_loop && is_code_command;
        let loop_iterations = flags
            .iterations
            .unwrap_or(config.improvement_loops.max_iterations);

        let resolved = ResolvedCapabilities {
            depth_tier,
            token_budget: depth_tier.token_budget(),
            compact: !flags.no_compact,
            mode,
            mcp_hint,
            tdd: flags.tdd,
            rules_enabled: true,
            loop_enabled,
            loop_iterations,
            gates_enabled: config.verification.require_before_completion,
            staleness_threshold_seconds: config.verification.staleness_threshold_seconds,
        };
        info!(
            depth = %resolved.depth_tier,
            mode = %resolved.mode,
            loop_enabled = resolved.loop_enabled,
            "resolved capabilities",
        );
        resolved
    }

    /// Scan every task, auto-detect a tier per task, take the deepest.
    fn deepest_task_tier(graph: Option<&TaskGraph>) -> DepthTier {
        let Some(graph) = graph else {
            return DepthTier::Standard;
        };
        graph
            .all_tasks()
            .map(|task| DepthTier::detect(&task.description, task.files.total_count()))
            .max()
            .unwrap_or(DepthTier::Standard)
    }
}

#[cfg(test)]
#[path = "capability_tests.rs"]
mod tests;
