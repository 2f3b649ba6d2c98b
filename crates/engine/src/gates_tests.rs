// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use zerg_core::FakeClock;

fn gate(name: &str, command: &str) -> QualityGate {
    QualityGate {
        name: name.into(),
        command: command.into(),
        required: false,
        timeout: 30,
        coverage_threshold: None,
        is_test_gate: false,
    }
}

fn pipeline(dir: &Path, clock: &FakeClock) -> GatePipeline {
    GatePipeline::new(dir.join("artifacts"), 300, true, Arc::new(clock.clone()))
}

#[tokio::test]
async fn passing_gate_captures_output() {
    let dir = tempfile::tempdir().unwrap();
    let runner = GateRunner;
    let result = runner.run_gate(&gate("echo", "echo checked"), dir.path()).await;
    assert_eq!(result.result, GateOutcome::Pass);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), "checked");
}

#[tokio::test]
async fn failing_gate_reports_fail() {
    let dir = tempfile::tempdir().unwrap();
    let runner = GateRunner;
    let result = runner
        .run_gate(&gate("lint", "echo broken >&2; exit 1"), dir.path())
        .await;
    assert_eq!(result.result, GateOutcome::Fail);
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr.trim(), "broken");
}

#[tokio::test]
async fn gate_timeout_is_an_error_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let runner = GateRunner;
    let mut slow = gate("slow", "sleep 30");
    slow.timeout = 1;
    let result = runner.run_gate(&slow, dir.path()).await;
    assert_eq!(result.result, GateOutcome::Error);
    assert!(result.stderr.contains("timed out"));
}

#[tokio::test]
async fn fresh_artifact_is_reused_without_execution() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new(1_000_000);
    let pipeline = pipeline(dir.path(), &clock);
    let marker = dir.path().join("ran");
    let command = format!("echo ran >> {}", marker.display());
    let gates = vec![gate("lint", &command)];

    let first = pipeline
        .run_gates_for_level(1, &gates, dir.path(), false)
        .await;
    assert_eq!(first[0].result, GateOutcome::Pass);
    assert_eq!(std::fs::read_to_string(&marker).unwrap().lines().count(), 1);

    // 120 s later: inside the 300 s staleness window
    clock.advance_secs(120);
    let second = pipeline
        .run_gates_for_level(1, &gates, dir.path(), false)
        .await;
    assert_eq!(second[0].result, GateOutcome::Pass);
    // Command did NOT run again
    assert_eq!(std::fs::read_to_string(&marker).unwrap().lines().count(), 1);
}

#[tokio::test]
async fn stale_artifact_reruns_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new(1_000_000);
    let pipeline = pipeline(dir.path(), &clock);
    let marker = dir.path().join("ran");
    let command = format!("echo ran >> {}", marker.display());
    let gates = vec![gate("lint", &command)];

    pipeline
        .run_gates_for_level(1, &gates, dir.path(), false)
        .await;
    // 301 s later the cache has expired
    clock.advance_secs(301);
    pipeline
        .run_gates_for_level(1, &gates, dir.path(), false)
        .await;
    assert_eq!(std::fs::read_to_string(&marker).unwrap().lines().count(), 2);
}

#[tokio::test]
async fn artifacts_are_scoped_by_level() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new(1_000_000);
    let pipeline = pipeline(dir.path(), &clock);
    let gates = vec![gate("lint", "true")];

    pipeline
        .run_gates_for_level(1, &gates, dir.path(), false)
        .await;
    pipeline
        .run_gates_for_level(2, &gates, dir.path(), false)
        .await;
    assert!(dir.path().join("artifacts/1/lint.json").exists());
    assert!(dir.path().join("artifacts/2/lint.json").exists());
}

#[tokio::test]
async fn skip_tests_skips_test_gates_only() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new(1_000_000);
    let pipeline = pipeline(dir.path(), &clock);
    let mut test_gate = gate("test", "exit 1");
    test_gate.is_test_gate = true;
    let gates = vec![gate("lint", "true"), test_gate];

    let results = pipeline
        .run_gates_for_level(1, &gates, dir.path(), true)
        .await;
    assert_eq!(results[0].result, GateOutcome::Pass);
    assert_eq!(results[1].result, GateOutcome::Skip);
}

#[tokio::test]
async fn required_failure_stops_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new(1_000_000);
    let pipeline = pipeline(dir.path(), &clock);
    let mut first = gate("lint", "exit 1");
    first.required = true;
    let gates = vec![first, gate("later", "true")];

    let results = pipeline
        .run_gates_for_level(1, &gates, dir.path(), false)
        .await;
    assert_eq!(results.len(), 1);
    assert!(!GatePipeline::required_passed(&gates, &results));
}

#[test]
fn pass_fraction_counts_skips_as_passes() {
    let results = vec![
        GateRunResult::skipped("test", "cargo test"),
        GateRunResult {
            name: "lint".into(),
            result: GateOutcome::Fail,
            command: "lint".into(),
            exit_code: 1,
            duration_ms: 5,
            stdout: String::new(),
            stderr: String::new(),
        },
    ];
    assert!((GatePipeline::pass_fraction(&results) - 0.5).abs() < f64::EPSILON);
    assert!((GatePipeline::pass_fraction(&[]) - 1.0).abs() < f64::EPSILON);
}
