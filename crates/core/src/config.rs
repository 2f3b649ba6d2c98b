// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered configuration loaded from `.zerg/config.toml`.
//!
//! Defaults are compiled in; a missing file yields the default config, a
//! malformed file is a hard error. Validated once at load and treated as
//! immutable afterwards; components receive only the slice they need.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Complete ZERG configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZergConfig {
    pub project: ProjectConfig,
    pub workers: WorkersConfig,
    pub agent: AgentConfig,
    pub ports: PortsConfig,
    pub quality_gates: Vec<QualityGate>,
    pub resources: ResourcesConfig,
    pub logging: LoggingConfig,
    pub heartbeat: HeartbeatConfig,
    pub error_recovery: ErrorRecoveryConfig,
    pub merge: MergeConfig,
    pub verification: VerificationConfig,
    pub improvement_loops: LoopsConfig,
    pub rush: RushConfig,
}

impl ZergConfig {
    /// Load from `.zerg/config.toml` under `repo_root`, or defaults when
    /// the file does not exist. Malformed files fail loudly.
    pub fn load(repo_root: &Path) -> Result<Self, ConfigError> {
        Self::load_from(&repo_root.join(".zerg/config.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: ZergConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks that cannot be expressed in serde defaults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.max_concurrent == 0 || self.workers.max_concurrent > 10 {
            return Err(ConfigError::Invalid(format!(
                "workers.max_concurrent must be 1..=10, got {}",
                self.workers.max_concurrent
            )));
        }
        if self.ports.range_start < 1024 || self.ports.range_start > self.ports.range_end {
            return Err(ConfigError::Invalid(format!(
                "ports range [{}, {}] is not a valid range above 1024",
                self.ports.range_start, self.ports.range_end
            )));
        }
        let bp = &self.error_recovery.backpressure;
        if !(0.1..=1.0).contains(&bp.failure_rate_threshold) {
            return Err(ConfigError::Invalid(format!(
                "backpressure.failure_rate_threshold must be 0.1..=1.0, got {}",
                bp.failure_rate_threshold
            )));
        }
        if bp.window_size < 3 {
            return Err(ConfigError::Invalid(format!(
                "backpressure.window_size must be at least 3, got {}",
                bp.window_size
            )));
        }
        if self.workers.backoff_base_seconds == 0
            || self.workers.backoff_max_seconds < self.workers.backoff_base_seconds
        {
            return Err(ConfigError::Invalid(format!(
                "workers backoff base/max ({}, {}) is not a valid pair",
                self.workers.backoff_base_seconds, self.workers.backoff_max_seconds
            )));
        }
        Ok(())
    }

    pub fn get_gate(&self, name: &str) -> Option<&QualityGate> {
        self.quality_gates.iter().find(|g| g.name == name)
    }

    pub fn required_gates(&self) -> impl Iterator<Item = &QualityGate> {
        self.quality_gates.iter().filter(|g| g.required)
    }

    /// Context threshold as a 0.0..=1.0 fraction.
    pub fn context_threshold(&self) -> f64 {
        f64::from(self.workers.context_threshold_percent) / 100.0
    }
}

/// Project identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub description: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "zerg".into(),
            description: "Parallel code-generation orchestration".into(),
        }
    }
}

/// Retry backoff strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    #[default]
    Exponential,
    Linear,
    Fixed,
}

/// Policy when every worker slot has exhausted its respawn budget while
/// tasks remain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RespawnExhaustedPolicy {
    /// Pause with a recoverable error; remaining tasks stay pending for
    /// `--resume`.
    #[default]
    Park,
    /// Fail the feature outright.
    Fail,
}

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub max_concurrent: u32,
    pub timeout_minutes: u64,
    pub retry_attempts: u32,
    pub context_threshold_percent: u32,
    pub backoff_strategy: BackoffStrategy,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
    pub task_stale_timeout_seconds: u64,
    pub max_respawn_attempts: u32,
    pub auto_respawn: bool,
    pub on_respawn_exhausted: RespawnExhaustedPolicy,
    /// Seconds a ready worker waits for a claimable task before exiting.
    pub claim_max_wait_seconds: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            timeout_minutes: 30,
            retry_attempts: 3,
            context_threshold_percent: 80,
            backoff_strategy: BackoffStrategy::Exponential,
            backoff_base_seconds: 30,
            backoff_max_seconds: 300,
            task_stale_timeout_seconds: 600,
            max_respawn_attempts: 5,
            auto_respawn: true,
            on_respawn_exhausted: RespawnExhaustedPolicy::Park,
            claim_max_wait_seconds: 120,
        }
    }
}

/// LLM agent command settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Command invoked to implement a task. The prompt is appended as the
    /// final argument.
    pub command: String,
    pub args: Vec<String>,
    pub timeout_minutes: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "claude".into(),
            args: vec![
                "--print".into(),
                "--dangerously-skip-permissions".into(),
            ],
            timeout_minutes: 30,
        }
    }
}

/// Port allocation range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    pub range_start: u16,
    pub range_end: u16,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            range_start: 49152,
            range_end: 65535,
        }
    }
}

/// Single quality gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityGate {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_gate_timeout")]
    pub timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_threshold: Option<u32>,
    /// Test gates are skipped under `--skip-tests`.
    #[serde(default)]
    pub is_test_gate: bool,
}

fn default_gate_timeout() -> u64 {
    300
}

/// Per-worker resource limits (container backend).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    pub container_memory_limit: String,
    pub container_cpu_limit: f64,
    pub container_image: String,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            container_memory_limit: "4g".into(),
            container_cpu_limit: 2.0,
            container_image: "zerg-worker".into(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            directory: ".zerg/logs".into(),
        }
    }
}

/// Heartbeat / stall detection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub stall_timeout_seconds: u64,
    /// Minimum seconds between stall verdicts for the same worker.
    pub stall_cooldown_seconds: u64,
    pub max_restarts: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            // Workers only touch their record between tasks, so the stall
            // window must cover a full agent invocation
            stall_timeout_seconds: 2400,
            stall_cooldown_seconds: 10,
            max_restarts: 3,
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub cooldown_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 3,
            cooldown_seconds: 60,
        }
    }
}

/// Backpressure settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackpressureConfig {
    pub enabled: bool,
    pub failure_rate_threshold: f64,
    pub window_size: usize,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_rate_threshold: 0.5,
            window_size: 10,
        }
    }
}

/// Error recovery settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorRecoveryConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub backpressure: BackpressureConfig,
}

/// Level merge settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub target_branch: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            target_branch: "main".into(),
            timeout_seconds: 600,
            max_retries: 3,
        }
    }
}

/// Gate pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub require_before_completion: bool,
    pub staleness_threshold_seconds: u64,
    pub artifact_dir: String,
    pub stop_on_required_failure: bool,
    /// Retries of a task's verification command (same command, not a new
    /// derivation).
    pub max_retries: u32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            require_before_completion: true,
            staleness_threshold_seconds: 300,
            artifact_dir: ".zerg/artifacts".into(),
            stop_on_required_failure: true,
            max_retries: 2,
        }
    }
}

/// Improvement loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopsConfig {
    pub max_iterations: u32,
    pub convergence_threshold: f64,
    pub plateau_threshold: u32,
    pub rollback_on_regression: bool,
}

impl Default for LoopsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            convergence_threshold: 0.02,
            plateau_threshold: 2,
            rollback_on_regression: true,
        }
    }
}

/// Rush-specific toggles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RushConfig {
    /// Defer the level merge to ship time (levels complete without merging).
    pub defer_merge_to_ship: bool,
    /// Run gates only at ship time, not per level.
    pub gates_at_ship_only: bool,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
