// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-key circuit breaker.
//!
//! A key (worker slot, retry target) opens after N consecutive failures,
//! half-opens once the cooldown elapses, closes on one success and
//! re-opens on one failure while half-open. Advisory: the orchestrator
//! consults it before scheduling retries.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use zerg_core::{CircuitBreakerConfig, Clock};

/// Current state of one circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
struct Circuit {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at_ms: Option<u64>,
}

impl Default for Circuit {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at_ms: None,
        }
    }
}

/// Keyed circuit breaker.
pub struct CircuitBreaker {
    enabled: bool,
    failure_threshold: u32,
    cooldown_ms: u64,
    circuits: HashMap<String, Circuit>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            enabled: config.enabled,
            failure_threshold: config.failure_threshold,
            cooldown_ms: config.cooldown_seconds * 1000,
            circuits: HashMap::new(),
            clock,
        }
    }

    /// Whether an attempt against `key` may proceed. Transitions an open
    /// circuit to half-open when its cooldown has elapsed.
    pub fn allows(&mut self, key: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let now = self.clock.now_ms();
        let circuit = self.circuits.entry(key.to_string()).or_default();
        match circuit.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let opened = circuit.opened_at_ms.unwrap_or(0);
                if now.saturating_sub(opened) >= self.cooldown_ms {
                    circuit.state = BreakerState::HalfOpen;
                    info!(key, "circuit half-open after cooldown");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// One success closes a half-open circuit and resets the failure run.
    pub fn record_success(&mut self, key: &str) {
        if !self.enabled {
            return;
        }
        let circuit = self.circuits.entry(key.to_string()).or_default();
        if circuit.state != BreakerState::Closed {
            info!(key, "circuit closed");
        }
        *circuit = Circuit::default();
    }

    /// A failure while half-open re-opens immediately; otherwise the
    /// consecutive-failure count trips the breaker at the threshold.
    /// Returns `true` when this call opened the circuit.
    pub fn record_failure(&mut self, key: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let now = self.clock.now_ms();
        let threshold = self.failure_threshold;
        let circuit = self.circuits.entry(key.to_string()).or_default();
        circuit.consecutive_failures += 1;

        let should_open = match circuit.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => circuit.consecutive_failures >= threshold,
            BreakerState::Open => false,
        };
        if should_open {
            circuit.state = BreakerState::Open;
            circuit.opened_at_ms = Some(now);
            warn!(
                key,
                failures = circuit.consecutive_failures,
                "circuit opened",
            );
        }
        should_open
    }

    pub fn state(&self, key: &str) -> BreakerState {
        self.circuits
            .get(key)
            .map(|c| c.state)
            .unwrap_or(BreakerState::Closed)
    }

    /// Per-key state snapshot for the status report.
    pub fn status(&self) -> HashMap<String, BreakerState> {
        self.circuits
            .iter()
            .map(|(key, circuit)| (key.clone(), circuit.state))
            .collect()
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
