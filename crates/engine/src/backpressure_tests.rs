// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn controller(window_size: usize) -> BackpressureController {
    BackpressureController::new(&BackpressureConfig {
        enabled: true,
        failure_rate_threshold: 0.5,
        window_size,
    })
}

#[test]
fn register_level_sets_totals() {
    let mut ctrl = controller(10);
    ctrl.register_level(1, 5);
    let status = ctrl.status();
    assert_eq!(status[&1].total_tasks, 5);
    assert!(!status[&1].paused);
}

#[test]
fn counters_increment() {
    let mut ctrl = controller(10);
    ctrl.register_level(1, 3);
    ctrl.record_success(1);
    ctrl.record_success(1);
    ctrl.record_failure(1);
    let status = ctrl.status();
    assert_eq!(status[&1].completed, 2);
    assert_eq!(status[&1].failed, 1);
}

#[test]
fn levels_auto_create_on_first_outcome() {
    let mut ctrl = controller(10);
    ctrl.record_success(99);
    ctrl.record_failure(42);
    assert!(ctrl.status().contains_key(&99));
    assert!(ctrl.status().contains_key(&42));
}

#[test]
fn insufficient_samples_never_pause() {
    let mut ctrl = controller(10);
    ctrl.record_failure(1);
    ctrl.record_failure(1);
    // 100% failure rate but only two samples
    assert!(!ctrl.should_pause(1));
}

#[test]
fn pause_triggers_past_threshold() {
    let mut ctrl = controller(10);
    ctrl.register_level(1, 5);
    ctrl.record_success(1);
    ctrl.record_success(1);
    ctrl.record_failure(1);
    ctrl.record_failure(1);
    ctrl.record_failure(1);
    // 3/5 = 0.6 > 0.5
    assert!(ctrl.should_pause(1));
}

#[test]
fn rate_at_threshold_does_not_pause() {
    let mut ctrl = controller(10);
    for _ in 0..2 {
        ctrl.record_success(1);
        ctrl.record_failure(1);
    }
    // Exactly 0.5 is not an excess
    assert!(!ctrl.should_pause(1));
}

#[test]
fn paused_level_stops_reporting_should_pause() {
    let mut ctrl = controller(10);
    for _ in 0..6 {
        ctrl.record_failure(1);
    }
    assert!(ctrl.should_pause(1));
    ctrl.pause_level(1, 1_000);
    assert!(ctrl.is_paused(1));
    // "Exactly once" semantics
    assert!(!ctrl.should_pause(1));
}

#[test]
fn resume_clears_the_window() {
    let mut ctrl = controller(10);
    for _ in 0..4 {
        ctrl.record_failure(1);
    }
    assert!((ctrl.failure_rate(1) - 1.0).abs() < f64::EPSILON);
    ctrl.pause_level(1, 1_000);
    ctrl.resume_level(1);
    assert!(!ctrl.is_paused(1));
    assert!((ctrl.failure_rate(1)).abs() < f64::EPSILON);
    assert!(!ctrl.should_pause(1));
}

#[test]
fn sliding_window_evicts_old_outcomes() {
    let mut ctrl = controller(3);
    ctrl.record_failure(1);
    ctrl.record_failure(1);
    ctrl.record_failure(1);
    assert!((ctrl.failure_rate(1) - 1.0).abs() < f64::EPSILON);
    ctrl.record_success(1);
    assert!((ctrl.failure_rate(1) - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn unknown_level_is_not_paused() {
    let ctrl = controller(10);
    assert!(!ctrl.is_paused(999));
    assert!(!ctrl.should_pause(999));
    assert!((ctrl.failure_rate(999)).abs() < f64::EPSILON);
}

#[test]
fn disabled_controller_noops() {
    let mut ctrl = BackpressureController::new(&BackpressureConfig {
        enabled: false,
        failure_rate_threshold: 0.5,
        window_size: 10,
    });
    ctrl.record_success(1);
    ctrl.record_failure(1);
    assert!(ctrl.status().is_empty());
    assert!(!ctrl.should_pause(1));
}

#[test]
fn levels_are_independent() {
    let mut ctrl = controller(10);
    ctrl.register_level(1, 5);
    ctrl.register_level(2, 3);
    for _ in 0..4 {
        ctrl.record_failure(1);
    }
    for _ in 0..3 {
        ctrl.record_success(2);
    }
    assert!(ctrl.should_pause(1));
    assert!(!ctrl.should_pause(2));
}
