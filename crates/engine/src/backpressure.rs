// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-level backpressure: a sliding window of task outcomes pauses the
//! level when the failure rate runs too high.
//!
//! Advisory: the orchestrator asks `should_pause` after recording each
//! outcome and is responsible for the actual pause (rejecting claims)
//! and for resuming, which clears the window.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::info;
use zerg_core::BackpressureConfig;

/// Outcomes required in the window before a pause verdict is possible.
const MIN_SAMPLES: usize = 3;

#[derive(Debug, Default)]
struct LevelPressure {
    total_tasks: u32,
    completed: u32,
    failed: u32,
    /// Sliding window of recent outcomes; `true` = success.
    window: VecDeque<bool>,
    paused: bool,
    paused_at_ms: Option<u64>,
}

/// Status snapshot for one level.
#[derive(Debug, Clone, Serialize)]
pub struct LevelPressureStatus {
    pub level: u32,
    pub total_tasks: u32,
    pub completed: u32,
    pub failed: u32,
    pub failure_rate: f64,
    pub paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_at_ms: Option<u64>,
}

/// Sliding-window failure-rate guard, one window per level.
pub struct BackpressureController {
    enabled: bool,
    failure_rate_threshold: f64,
    window_size: usize,
    levels: HashMap<u32, LevelPressure>,
}

impl BackpressureController {
    pub fn new(config: &BackpressureConfig) -> Self {
        Self {
            enabled: config.enabled,
            failure_rate_threshold: config.failure_rate_threshold,
            window_size: config.window_size,
            levels: HashMap::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Register a level before its tasks start.
    pub fn register_level(&mut self, level: u32, total_tasks: u32) {
        if !self.enabled {
            return;
        }
        let pressure = self.levels.entry(level).or_default();
        pressure.total_tasks = total_tasks;
    }

    pub fn record_success(&mut self, level: u32) {
        if !self.enabled {
            return;
        }
        let window_size = self.window_size;
        let pressure = self.levels.entry(level).or_default();
        pressure.completed += 1;
        push_window(&mut pressure.window, window_size, true);
    }

    pub fn record_failure(&mut self, level: u32) {
        if !self.enabled {
            return;
        }
        let window_size = self.window_size;
        let pressure = self.levels.entry(level).or_default();
        pressure.failed += 1;
        push_window(&mut pressure.window, window_size, false);
    }

    /// Failure rate over the current window (0.0 when empty).
    pub fn failure_rate(&self, level: u32) -> f64 {
        let Some(pressure) = self.levels.get(&level) else {
            return 0.0;
        };
        if pressure.window.is_empty() {
            return 0.0;
        }
        let failures = pressure.window.iter().filter(|ok| !**ok).count();
        failures as f64 / pressure.window.len() as f64
    }

    /// Whether the level should pause now. False with insufficient
    /// samples, when disabled, or when the level is already paused.
    pub fn should_pause(&self, level: u32) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(pressure) = self.levels.get(&level) else {
            return false;
        };
        if pressure.paused || pressure.window.len() < MIN_SAMPLES {
            return false;
        }
        self.failure_rate(level) > self.failure_rate_threshold
    }

    pub fn pause_level(&mut self, level: u32, now_ms: u64) {
        let pressure = self.levels.entry(level).or_default();
        pressure.paused = true;
        pressure.paused_at_ms = Some(now_ms);
        info!(level, "level paused by backpressure");
    }

    /// Resume a paused level; the outcome window starts fresh.
    pub fn resume_level(&mut self, level: u32) {
        if let Some(pressure) = self.levels.get_mut(&level) {
            pressure.paused = false;
            pressure.paused_at_ms = None;
            pressure.window.clear();
            info!(level, "level resumed");
        }
    }

    pub fn is_paused(&self, level: u32) -> bool {
        self.levels.get(&level).map(|p| p.paused).unwrap_or(false)
    }

    pub fn status(&self) -> HashMap<u32, LevelPressureStatus> {
        self.levels
            .iter()
            .map(|(level, pressure)| {
                (
                    *level,
                    LevelPressureStatus {
                        level: *level,
                        total_tasks: pressure.total_tasks,
                        completed: pressure.completed,
                        failed: pressure.failed,
                        failure_rate: self.failure_rate(*level),
                        paused: pressure.paused,
                        paused_at_ms: pressure.paused_at_ms,
                    },
                )
            })
            .collect()
    }
}

fn push_window(window: &mut VecDeque<bool>, size: usize, ok: bool) {
    window.push_back(ok);
    while window.len() > size {
        window.pop_front();
    }
}

#[cfg(test)]
#[path = "backpressure_tests.rs"]
mod tests;
