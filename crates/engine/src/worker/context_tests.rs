// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fresh_tracker_is_empty() {
    let tracker = ContextTracker::new(0.8, 100_000);
    assert!(tracker.usage().abs() < f64::EPSILON);
    assert!(!tracker.should_checkpoint());
}

#[test]
fn output_and_tasks_accumulate() {
    let mut tracker = ContextTracker::new(0.8, 10_000);
    tracker.track_agent_output(4_000); // 1_000 tokens
    tracker.track_task_execution(); // 1_500 tokens
    assert!((tracker.usage() - 0.25).abs() < f64::EPSILON);
}

#[test]
fn crossing_threshold_requests_checkpoint() {
    let mut tracker = ContextTracker::new(0.5, 10_000);
    tracker.track_agent_output(4 * 4_999);
    assert!(!tracker.should_checkpoint());
    tracker.track_agent_output(8);
    assert!(tracker.should_checkpoint());
}

#[test]
fn usage_saturates_at_one() {
    let mut tracker = ContextTracker::new(0.8, 1_000);
    tracker.track_agent_output(1_000_000);
    assert!((tracker.usage() - 1.0).abs() < f64::EPSILON);
}
