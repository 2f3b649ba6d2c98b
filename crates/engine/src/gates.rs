// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Quality gate execution with artifact persistence and staleness reuse.
//!
//! [`GateRunner`] executes one gate command; [`GatePipeline`] wraps it
//! with per-level artifact caching at `.zerg/artifacts/{level}/{gate}.json`:
//! a fresh artifact is reconstructed instead of re-running the command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{info, warn};
use zerg_adapters::run_with_timeout;
use zerg_core::{
    truncate_output, Clock, GateArtifact, GateOutcome, GateRunResult, QualityGate,
};

/// Executes gate commands through the shell.
#[derive(Debug, Clone, Default)]
pub struct GateRunner;

impl GateRunner {
    /// Run one gate command, capturing exit code and truncated output.
    pub async fn run_gate(&self, gate: &QualityGate, cwd: &Path) -> GateRunResult {
        let started = Instant::now();
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&gate.command).current_dir(cwd);

        let timeout = Duration::from_secs(gate.timeout);
        match run_with_timeout(cmd, timeout, &format!("gate '{}'", gate.name)).await {
            Ok(output) => {
                let exit_code = output.status.code().unwrap_or(-1);
                let result = if output.status.success() {
                    GateOutcome::Pass
                } else {
                    GateOutcome::Fail
                };
                GateRunResult {
                    name: gate.name.clone(),
                    result,
                    command: gate.command.clone(),
                    exit_code,
                    duration_ms: started.elapsed().as_millis() as u64,
                    stdout: truncate_output(&String::from_utf8_lossy(&output.stdout)),
                    stderr: truncate_output(&String::from_utf8_lossy(&output.stderr)),
                }
            }
            Err(message) => GateRunResult {
                name: gate.name.clone(),
                result: GateOutcome::Error,
                command: gate.command.clone(),
                exit_code: -1,
                duration_ms: started.elapsed().as_millis() as u64,
                stdout: String::new(),
                stderr: truncate_output(&message),
            },
        }
    }
}

/// Gate execution with cached artifacts and staleness checking.
pub struct GatePipeline {
    runner: GateRunner,
    artifacts_dir: PathBuf,
    staleness_threshold_seconds: u64,
    stop_on_required_failure: bool,
    clock: Arc<dyn Clock>,
}

impl GatePipeline {
    pub fn new(
        artifacts_dir: PathBuf,
        staleness_threshold_seconds: u64,
        stop_on_required_failure: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            runner: GateRunner,
            artifacts_dir,
            staleness_threshold_seconds,
            stop_on_required_failure,
            clock,
        }
    }

    fn artifact_path(&self, level: u32, gate_name: &str) -> PathBuf {
        self.artifacts_dir
            .join(level.to_string())
            .join(format!("{gate_name}.json"))
    }

    fn load_cached(&self, level: u32, gate_name: &str) -> Option<GateArtifact> {
        let path = self.artifact_path(level, gate_name);
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(artifact) => Some(artifact),
            Err(err) => {
                warn!(gate = gate_name, error = %err, "unreadable gate artifact; ignoring");
                None
            }
        }
    }

    fn store_artifact(&self, level: u32, result: &GateRunResult) {
        let path = self.artifact_path(level, &result.name);
        let artifact = GateArtifact {
            gate_name: result.name.clone(),
            timestamp_ms: self.clock.now_ms(),
            result: result.clone(),
        };
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("json.tmp");
            let json = serde_json::to_string_pretty(&artifact).unwrap_or_default();
            std::fs::write(&tmp, json)?;
            std::fs::rename(&tmp, &path)
        };
        if let Err(err) = write() {
            warn!(gate = %result.name, error = %err, "failed to persist gate artifact");
        }
    }

    /// Run `gates` for a level, reusing fresh artifacts.
    ///
    /// `skip_tests` turns test gates into skips. With
    /// stop-on-required-failure, gates after a failed required gate are
    /// not executed.
    pub async fn run_gates_for_level(
        &self,
        level: u32,
        gates: &[QualityGate],
        cwd: &Path,
        skip_tests: bool,
    ) -> Vec<GateRunResult> {
        let mut results = Vec::with_capacity(gates.len());
        for gate in gates {
            if skip_tests && gate.is_test_gate {
                info!(gate = %gate.name, level, "skipping test gate");
                results.push(GateRunResult::skipped(&gate.name, &gate.command));
                continue;
            }

            if let Some(cached) = self.load_cached(level, &gate.name) {
                if cached.is_fresh(self.clock.now_ms(), self.staleness_threshold_seconds) {
                    info!(gate = %gate.name, level, "gate artifact still fresh; reusing");
                    results.push(cached.result);
                    continue;
                }
            }

            let result = self.runner.run_gate(gate, cwd).await;
            info!(
                gate = %gate.name,
                level,
                outcome = %result.result,
                exit_code = result.exit_code,
                "gate executed",
            );
            self.store_artifact(level, &result);
            let failed_required = gate.required && !result.result.passed();
            results.push(result);
            if failed_required && self.stop_on_required_failure {
                warn!(gate = %gate.name, level, "required gate failed; stopping pipeline");
                break;
            }
        }
        results
    }

    /// True when every required gate in `results` passed.
    pub fn required_passed(gates: &[QualityGate], results: &[GateRunResult]) -> bool {
        for gate in gates.iter().filter(|g| g.required) {
            match results.iter().find(|r| r.name == gate.name) {
                Some(result) if result.result.passed() => {}
                // Missing result means the pipeline stopped early
                _ => return false,
            }
        }
        true
    }

    /// Fraction of gates that passed (1.0 for an empty set).
    pub fn pass_fraction(results: &[GateRunResult]) -> f64 {
        if results.is_empty() {
            return 1.0;
        }
        let passed = results.iter().filter(|r| r.result.passed()).count();
        passed as f64 / results.len() as f64
    }
}

#[cfg(test)]
#[path = "gates_tests.rs"]
mod tests;
