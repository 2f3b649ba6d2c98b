// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_is_monotonic_enough() {
    let clock = SystemClock;
    let a = clock.now_ms();
    let b = clock.now_ms();
    assert!(b >= a);
    assert!(a > 1_600_000_000_000, "epoch ms expected, got {a}");
}

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::new(1_000);
    assert_eq!(clock.now_ms(), 1_000);
    clock.advance_ms(500);
    assert_eq!(clock.now_ms(), 1_500);
    clock.advance_secs(2);
    assert_eq!(clock.now_ms(), 3_500);
    assert_eq!(clock.now_secs(), 3);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new(0);
    let other = clock.clone();
    clock.advance_ms(42);
    assert_eq!(other.now_ms(), 42);
}
