// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use zerg_core::FakeClock;

fn breaker(clock: &FakeClock) -> CircuitBreaker {
    CircuitBreaker::new(
        &CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 3,
            cooldown_seconds: 60,
        },
        Arc::new(clock.clone()),
    )
}

#[test]
fn opens_after_threshold_consecutive_failures() {
    let clock = FakeClock::new(0);
    let mut breaker = breaker(&clock);
    assert!(!breaker.record_failure("worker-0"));
    assert!(!breaker.record_failure("worker-0"));
    assert!(breaker.record_failure("worker-0"));
    assert_eq!(breaker.state("worker-0"), BreakerState::Open);
    assert!(!breaker.allows("worker-0"));
}

#[test]
fn success_resets_failure_run() {
    let clock = FakeClock::new(0);
    let mut breaker = breaker(&clock);
    breaker.record_failure("w");
    breaker.record_failure("w");
    breaker.record_success("w");
    assert!(!breaker.record_failure("w"));
    assert!(!breaker.record_failure("w"));
    assert_eq!(breaker.state("w"), BreakerState::Closed);
}

#[test]
fn cooldown_half_opens_then_success_closes() {
    let clock = FakeClock::new(0);
    let mut breaker = breaker(&clock);
    for _ in 0..3 {
        breaker.record_failure("w");
    }
    assert!(!breaker.allows("w"));

    clock.advance_secs(60);
    assert!(breaker.allows("w"));
    assert_eq!(breaker.state("w"), BreakerState::HalfOpen);

    breaker.record_success("w");
    assert_eq!(breaker.state("w"), BreakerState::Closed);
    assert!(breaker.allows("w"));
}

#[test]
fn half_open_failure_reopens_immediately() {
    let clock = FakeClock::new(0);
    let mut breaker = breaker(&clock);
    for _ in 0..3 {
        breaker.record_failure("w");
    }
    clock.advance_secs(60);
    assert!(breaker.allows("w"));

    assert!(breaker.record_failure("w"));
    assert_eq!(breaker.state("w"), BreakerState::Open);
    assert!(!breaker.allows("w"));
}

#[test]
fn keys_are_independent() {
    let clock = FakeClock::new(0);
    let mut breaker = breaker(&clock);
    for _ in 0..3 {
        breaker.record_failure("a");
    }
    assert!(!breaker.allows("a"));
    assert!(breaker.allows("b"));
    assert_eq!(breaker.status().len(), 2);
}

#[test]
fn disabled_breaker_always_allows() {
    let clock = FakeClock::new(0);
    let mut breaker = CircuitBreaker::new(
        &CircuitBreakerConfig {
            enabled: false,
            failure_threshold: 1,
            cooldown_seconds: 60,
        },
        Arc::new(clock),
    );
    assert!(!breaker.record_failure("w"));
    assert!(breaker.allows("w"));
    assert_eq!(breaker.state("w"), BreakerState::Closed);
}
