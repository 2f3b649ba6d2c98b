// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Iterative improvement loop controller.
//!
//! Runs an improve callback repeatedly after a level merge, tracking
//! scores and stopping on convergence, plateau, regression, or the
//! iteration cap.

use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};
use zerg_core::LoopsConfig;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Converged,
    Plateau,
    Regressed,
    MaxIterations,
    Aborted,
}

impl std::fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoopStatus::Converged => "converged",
            LoopStatus::Plateau => "plateau",
            LoopStatus::Regressed => "regressed",
            LoopStatus::MaxIterations => "max_iterations",
            LoopStatus::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// Result of a single iteration.
#[derive(Debug, Clone, Serialize)]
pub struct IterationResult {
    pub iteration: u32,
    pub score: f64,
    pub improved: bool,
    /// Change from the previous score.
    pub delta: f64,
    pub duration_ms: u64,
}

impl IterationResult {
    pub fn is_regression(&self) -> bool {
        self.delta < 0.0
    }
}

/// Summary of a completed loop.
#[derive(Debug, Clone, Serialize)]
pub struct LoopSummary {
    pub status: LoopStatus,
    pub iterations: Vec<IterationResult>,
    pub best_score: f64,
    pub best_iteration: u32,
    pub duration_ms: u64,
}

impl LoopSummary {
    /// Improvement from the starting score to the best score.
    pub fn improvement(&self) -> f64 {
        match self.iterations.first() {
            Some(first) => self.best_score - (first.score - first.delta),
            None => 0.0,
        }
    }

    pub fn converged(&self) -> bool {
        self.status == LoopStatus::Converged
    }
}

/// Controls improvement loops with convergence detection.
#[derive(Debug, Clone)]
pub struct LoopController {
    max_iterations: u32,
    convergence_threshold: f64,
    plateau_threshold: u32,
    rollback_on_regression: bool,
}

impl LoopController {
    pub fn new(config: &LoopsConfig, max_iterations: u32) -> Self {
        Self {
            max_iterations,
            convergence_threshold: config.convergence_threshold,
            plateau_threshold: config.plateau_threshold,
            rollback_on_regression: config.rollback_on_regression,
        }
    }

    /// Run the loop. `improve` receives the 1-based iteration number and
    /// returns the new score (higher is better); an `Err` aborts.
    pub async fn run<F, Fut>(&self, mut improve: F, initial_score: f64) -> LoopSummary
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<f64, String>>,
    {
        let mut iterations: Vec<IterationResult> = Vec::new();
        let mut best_score = initial_score;
        let mut best_iteration = 0;
        let mut plateau_count = 0;
        let mut small_gain_count = 0;
        let mut previous_score = initial_score;
        let started = Instant::now();
        let mut status = LoopStatus::MaxIterations;

        for i in 1..=self.max_iterations {
            let iteration_start = Instant::now();
            let score = match improve(i).await {
                Ok(score) => score,
                Err(error) => {
                    warn!(iteration = i, %error, "improvement iteration failed");
                    status = LoopStatus::Aborted;
                    break;
                }
            };

            let delta = score - previous_score;
            let improved = delta > self.convergence_threshold;
            iterations.push(IterationResult {
                iteration: i,
                score,
                improved,
                delta,
                duration_ms: iteration_start.elapsed().as_millis() as u64,
            });
            info!(
                iteration = i,
                score,
                delta,
                improved,
                "improvement iteration finished",
            );

            if score > best_score {
                best_score = score;
                best_iteration = i;
            }

            if delta < -self.convergence_threshold && self.rollback_on_regression {
                warn!(iteration = i, delta, "regression detected; stopping");
                status = LoopStatus::Regressed;
                break;
            }

            // Converged: a small positive delta two iterations in a row
            if delta > 0.0 && delta <= self.convergence_threshold {
                small_gain_count += 1;
                if small_gain_count >= 2 {
                    info!(iteration = i, delta, "converged");
                    status = LoopStatus::Converged;
                    break;
                }
            } else {
                small_gain_count = 0;
            }

            if improved {
                plateau_count = 0;
            } else {
                plateau_count += 1;
                if plateau_count >= self.plateau_threshold {
                    info!(iterations = plateau_count, "plateau reached");
                    status = LoopStatus::Plateau;
                    break;
                }
            }

            previous_score = score;
        }

        LoopSummary {
            status,
            iterations,
            best_score,
            best_iteration,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
#[path = "loops_tests.rs"]
mod tests;
