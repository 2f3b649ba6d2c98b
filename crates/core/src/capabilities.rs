// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolved cross-cutting capabilities injected into workers as `ZERG_*`
//! environment variables, plus the depth-tier and behavioral-mode types
//! they are derived from.

use serde::{Deserialize, Serialize};

/// Analysis depth tier. Deeper tiers get larger token budgets and more
/// MCP routing hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepthTier {
    Quick,
    #[default]
    Standard,
    Think,
    ThinkHard,
    Ultrathink,
}

const THINK_KEYWORDS: &[&str] = &["analyze", "investigate", "debug", "trace", "profile"];
const THINK_HARD_KEYWORDS: &[&str] = &[
    "architect",
    "redesign",
    "migrate",
    "security audit",
    "performance analysis",
    "system design",
];
const ULTRATHINK_KEYWORDS: &[&str] = &[
    "modernize",
    "rewrite",
    "critical",
    "production incident",
    "full audit",
    "comprehensive review",
];

impl DepthTier {
    pub fn token_budget(&self) -> u32 {
        match self {
            DepthTier::Quick => 1_000,
            DepthTier::Standard => 2_000,
            DepthTier::Think => 4_000,
            DepthTier::ThinkHard => 10_000,
            DepthTier::Ultrathink => 32_000,
        }
    }

    /// MCP servers recommended for this tier, deepest superset last.
    pub fn mcp_servers(&self) -> &'static [&'static str] {
        match self {
            DepthTier::Quick | DepthTier::Standard => &[],
            DepthTier::Think => &["sequential"],
            DepthTier::ThinkHard => &["sequential", "context7"],
            DepthTier::Ultrathink => &["sequential", "context7", "playwright", "morphllm"],
        }
    }

    pub fn env_value(&self) -> &'static str {
        match self {
            DepthTier::Quick => "quick",
            DepthTier::Standard => "standard",
            DepthTier::Think => "think",
            DepthTier::ThinkHard => "think-hard",
            DepthTier::Ultrathink => "ultrathink",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "quick" => Some(DepthTier::Quick),
            "standard" => Some(DepthTier::Standard),
            "think" => Some(DepthTier::Think),
            "think-hard" | "think_hard" => Some(DepthTier::ThinkHard),
            "ultrathink" => Some(DepthTier::Ultrathink),
            _ => None,
        }
    }

    /// Auto-detect a tier from a task description and the number of files
    /// it touches. The highest matching keyword tier wins; scope (file
    /// count) can escalate but never downgrade.
    pub fn detect(description: &str, file_count: usize) -> Self {
        let text = description.to_lowercase();
        let keyword_tier = if ULTRATHINK_KEYWORDS.iter().any(|k| text.contains(k)) {
            DepthTier::Ultrathink
        } else if THINK_HARD_KEYWORDS.iter().any(|k| text.contains(k)) {
            DepthTier::ThinkHard
        } else if THINK_KEYWORDS.iter().any(|k| text.contains(k)) {
            DepthTier::Think
        } else {
            DepthTier::Standard
        };

        let scope_tier = if file_count > 20 {
            DepthTier::ThinkHard
        } else if file_count > 7 {
            DepthTier::Think
        } else {
            DepthTier::Standard
        };

        keyword_tier.max(scope_tier)
    }
}

impl std::fmt::Display for DepthTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.env_value())
    }
}

/// How much verification a behavioral mode demands from the loop gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    None,
    Minimal,
    Full,
    Verbose,
}

/// Behavioral execution mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehavioralMode {
    #[default]
    Precision,
    Speed,
    Exploration,
    Refactor,
    Debug,
}

impl BehavioralMode {
    pub fn verification_level(&self) -> VerificationLevel {
        match self {
            BehavioralMode::Precision | BehavioralMode::Refactor => VerificationLevel::Full,
            BehavioralMode::Speed => VerificationLevel::Minimal,
            BehavioralMode::Exploration => VerificationLevel::None,
            BehavioralMode::Debug => VerificationLevel::Verbose,
        }
    }

    pub fn env_value(&self) -> &'static str {
        match self {
            BehavioralMode::Precision => "precision",
            BehavioralMode::Speed => "speed",
            BehavioralMode::Exploration => "exploration",
            BehavioralMode::Refactor => "refactor",
            BehavioralMode::Debug => "debug",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "precision" => Some(BehavioralMode::Precision),
            "speed" => Some(BehavioralMode::Speed),
            "exploration" => Some(BehavioralMode::Exploration),
            "refactor" => Some(BehavioralMode::Refactor),
            "debug" => Some(BehavioralMode::Debug),
            _ => None,
        }
    }
}

impl std::fmt::Display for BehavioralMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.env_value())
    }
}

/// Flat, merged set of per-run behavioral settings serialized into worker
/// environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCapabilities {
    pub depth_tier: DepthTier,
    pub token_budget: u32,
    pub compact: bool,
    pub mode: BehavioralMode,
    pub mcp_hint: String,
    pub tdd: bool,
    pub rules_enabled: bool,
    pub loop_enabled: bool,
    pub loop_iterations: u32,
    pub gates_enabled: bool,
    pub staleness_threshold_seconds: u64,
}

impl Default for ResolvedCapabilities {
    fn default() -> Self {
        Self {
            depth_tier: DepthTier::Standard,
            token_budget: DepthTier::Standard.token_budget(),
            compact: true,
            mode: BehavioralMode::Precision,
            mcp_hint: String::new(),
            tdd: false,
            rules_enabled: true,
            loop_enabled: true,
            loop_iterations: 5,
            gates_enabled: true,
            staleness_threshold_seconds: 300,
        }
    }
}

impl ResolvedCapabilities {
    /// Flat `ZERG_*` env var envelope for worker injection.
    pub fn to_env_vars(&self) -> Vec<(String, String)> {
        let flag = |b: bool| if b { "1" } else { "0" }.to_string();
        let mut env = vec![
            (
                "ZERG_ANALYSIS_DEPTH".to_string(),
                self.depth_tier.env_value().to_string(),
            ),
            ("ZERG_TOKEN_BUDGET".to_string(), self.token_budget.to_string()),
            ("ZERG_COMPACT_MODE".to_string(), flag(self.compact)),
            (
                "ZERG_BEHAVIORAL_MODE".to_string(),
                self.mode.env_value().to_string(),
            ),
            ("ZERG_TDD_MODE".to_string(), flag(self.tdd)),
            ("ZERG_RULES_ENABLED".to_string(), flag(self.rules_enabled)),
            ("ZERG_LOOP_ENABLED".to_string(), flag(self.loop_enabled)),
            (
                "ZERG_LOOP_ITERATIONS".to_string(),
                self.loop_iterations.to_string(),
            ),
            (
                "ZERG_VERIFICATION_GATES".to_string(),
                flag(self.gates_enabled),
            ),
            (
                "ZERG_STALENESS_THRESHOLD".to_string(),
                self.staleness_threshold_seconds.to_string(),
            ),
        ];
        if !self.mcp_hint.is_empty() {
            env.push(("ZERG_MCP_HINT".to_string(), self.mcp_hint.clone()));
        }
        env
    }
}

#[cfg(test)]
#[path = "capabilities_tests.rs"]
mod tests;
