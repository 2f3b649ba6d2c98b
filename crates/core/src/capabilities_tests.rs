// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[test]
fn token_budgets_increase_monotonically() {
    let tiers = [
        DepthTier::Quick,
        DepthTier::Standard,
        DepthTier::Think,
        DepthTier::ThinkHard,
        DepthTier::Ultrathink,
    ];
    let budgets: Vec<u32> = tiers.iter().map(|t| t.token_budget()).collect();
    let mut sorted = budgets.clone();
    sorted.sort_unstable();
    assert_eq!(budgets, sorted);
    assert_eq!(budgets, vec![1_000, 2_000, 4_000, 10_000, 32_000]);
}

#[test]
fn mcp_servers_form_subset_hierarchy() {
    let think: Vec<_> = DepthTier::Think.mcp_servers().to_vec();
    let think_hard: Vec<_> = DepthTier::ThinkHard.mcp_servers().to_vec();
    let ultra: Vec<_> = DepthTier::Ultrathink.mcp_servers().to_vec();
    assert!(think.iter().all(|s| think_hard.contains(s)));
    assert!(think_hard.iter().all(|s| ultra.contains(s)));
    assert!(DepthTier::Quick.mcp_servers().is_empty());
}

#[yare::parameterized(
    think_keyword      = { "Please analyze this code", 0, DepthTier::Think },
    think_hard_keyword = { "Need to redesign the system", 0, DepthTier::ThinkHard },
    ultra_keyword      = { "We must rewrite everything", 0, DepthTier::Ultrathink },
    case_insensitive   = { "ANALYZE this MODULE", 0, DepthTier::Think },
    no_keyword         = { "add a button to the form", 0, DepthTier::Standard },
    highest_wins       = { "critical analyze the system", 0, DepthTier::Ultrathink },
    scope_moderate     = { "", 10, DepthTier::Think },
    scope_large        = { "", 25, DepthTier::ThinkHard },
    scope_boundary_7   = { "", 7, DepthTier::Standard },
    scope_boundary_20  = { "", 20, DepthTier::Think },
    scope_escalates    = { "analyze module", 25, DepthTier::ThinkHard },
    scope_no_downgrade = { "critical issue", 1, DepthTier::Ultrathink },
)]
fn depth_detection(description: &str, file_count: usize, expected: DepthTier) {
    assert_eq!(DepthTier::detect(description, file_count), expected);
}

#[yare::parameterized(
    precision   = { BehavioralMode::Precision, VerificationLevel::Full },
    speed       = { BehavioralMode::Speed, VerificationLevel::Minimal },
    exploration = { BehavioralMode::Exploration, VerificationLevel::None },
    refactor    = { BehavioralMode::Refactor, VerificationLevel::Full },
    debug       = { BehavioralMode::Debug, VerificationLevel::Verbose },
)]
fn mode_verification_levels(mode: BehavioralMode, level: VerificationLevel) {
    assert_eq!(mode.verification_level(), level);
}

#[test]
fn depth_tier_parse_round_trips() {
    for tier in [
        DepthTier::Quick,
        DepthTier::Standard,
        DepthTier::Think,
        DepthTier::ThinkHard,
        DepthTier::Ultrathink,
    ] {
        assert_eq!(DepthTier::parse(tier.env_value()), Some(tier));
    }
    assert_eq!(DepthTier::parse("think_hard"), Some(DepthTier::ThinkHard));
    assert_eq!(DepthTier::parse("bogus"), None);
}

#[test]
fn env_vars_cover_the_envelope() {
    let caps = ResolvedCapabilities {
        depth_tier: DepthTier::ThinkHard,
        token_budget: DepthTier::ThinkHard.token_budget(),
        mcp_hint: "sequential,context7".into(),
        tdd: true,
        ..ResolvedCapabilities::default()
    };
    let env: HashMap<String, String> = caps.to_env_vars().into_iter().collect();
    assert_eq!(env["ZERG_ANALYSIS_DEPTH"], "think-hard");
    assert_eq!(env["ZERG_TOKEN_BUDGET"], "10000");
    assert_eq!(env["ZERG_COMPACT_MODE"], "1");
    assert_eq!(env["ZERG_BEHAVIORAL_MODE"], "precision");
    assert_eq!(env["ZERG_TDD_MODE"], "1");
    assert_eq!(env["ZERG_RULES_ENABLED"], "1");
    assert_eq!(env["ZERG_LOOP_ENABLED"], "1");
    assert_eq!(env["ZERG_LOOP_ITERATIONS"], "5");
    assert_eq!(env["ZERG_VERIFICATION_GATES"], "1");
    assert_eq!(env["ZERG_STALENESS_THRESHOLD"], "300");
    assert_eq!(env["ZERG_MCP_HINT"], "sequential,context7");
}

#[test]
fn mcp_hint_omitted_when_empty() {
    let caps = ResolvedCapabilities::default();
    let env: HashMap<String, String> = caps.to_env_vars().into_iter().collect();
    assert!(!env.contains_key("ZERG_MCP_HINT"));
}
