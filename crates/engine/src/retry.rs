// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task retry scheduling.
//!
//! Failures are classified into a [`FailureKind`] at the boundary (error
//! text → variant), then retried with backoff up to a per-kind limit by
//! stamping `retry_ready_at_ms` on the task record. The orchestrator
//! sweeps due timestamps back to pending. Worker crashes are
//! infrastructural and never consume retry budget.

use std::sync::Arc;
use tracing::{info, warn};
use zerg_core::{BackoffStrategy, Clock, FailureKind, TaskId, TaskStatus, WorkersConfig};
use zerg_storage::{StateStore, StoreError};

const DEPENDENCY_RETRY_LIMIT: u32 = 2;
const LOGIC_RETRY_LIMIT: u32 = 3;

/// Classify raw error text into a retry class.
///
/// Explicit variants instead of string matching downstream: only this
/// boundary inspects the message.
pub fn classify_failure(error: &str) -> FailureKind {
    let text = error.to_lowercase();
    const LOGIC: &[&str] = &["verification", "assert", "test failed", "lint"];
    const DEPENDENCY: &[&str] = &[
        "import",
        "unresolved",
        "missing",
        "not found",
        "no such file",
        "artifact",
    ];
    if text.contains("worker crash") {
        return FailureKind::WorkerCrash;
    }
    if LOGIC.iter().any(|k| text.contains(k)) {
        return FailureKind::Logic;
    }
    if DEPENDENCY.iter().any(|k| text.contains(k)) {
        return FailureKind::Dependency;
    }
    // Timeouts, network flakes, and anything unrecognized get the
    // transient treatment: retry with backoff up to the configured cap.
    FailureKind::Transient
}

/// Schedules retries for failed tasks and watches for stale ones.
pub struct RetryManager {
    strategy: BackoffStrategy,
    base_seconds: u64,
    max_seconds: u64,
    transient_limit: u32,
    stale_timeout_seconds: u64,
    clock: Arc<dyn Clock>,
}

impl RetryManager {
    pub fn new(workers: &WorkersConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            strategy: workers.backoff_strategy,
            base_seconds: workers.backoff_base_seconds,
            max_seconds: workers.backoff_max_seconds,
            transient_limit: workers.retry_attempts,
            stale_timeout_seconds: workers.task_stale_timeout_seconds,
            clock,
        }
    }

    /// Per-kind retry limit.
    pub fn retry_limit(&self, kind: FailureKind) -> u32 {
        match kind {
            FailureKind::Transient => self.transient_limit,
            FailureKind::Dependency => DEPENDENCY_RETRY_LIMIT,
            FailureKind::Logic => LOGIC_RETRY_LIMIT,
            // Crash reassignment does not go through retry budgeting
            FailureKind::WorkerCrash => u32::MAX,
        }
    }

    /// Delay before retry `attempt` (1-based), in milliseconds.
    pub fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        let attempt = attempt.max(1);
        let seconds = match self.strategy {
            BackoffStrategy::Exponential => {
                let shift = (attempt - 1).min(32);
                self.base_seconds.saturating_mul(1u64 << shift)
            }
            BackoffStrategy::Linear => self.base_seconds.saturating_mul(u64::from(attempt)),
            BackoffStrategy::Fixed => self.base_seconds,
        };
        seconds.min(self.max_seconds) * 1000
    }

    /// Classify and schedule retries for failures the worker reported but
    /// nothing has processed yet. Returns the tasks that got a retry
    /// scheduled.
    pub fn process_new_failures(
        &self,
        store: &mut StateStore,
    ) -> Result<Vec<TaskId>, StoreError> {
        let unprocessed: Vec<(TaskId, String, u32)> = store
            .state()
            .tasks
            .iter()
            .filter(|(_, r)| r.status() == TaskStatus::Failed)
            .filter(|(_, r)| r.failure_kind.is_none() && r.retry_ready_at_ms.is_none())
            .map(|(id, r)| {
                (
                    id.clone(),
                    r.last_error.clone().unwrap_or_default(),
                    r.retry_count,
                )
            })
            .collect();

        let mut scheduled = Vec::new();
        for (task_id, error, retry_count) in unprocessed {
            let kind = classify_failure(&error);
            if self.schedule_if_allowed(store, &task_id, kind, retry_count)? {
                scheduled.push(task_id);
            }
        }
        Ok(scheduled)
    }

    /// Schedule a retry for a failed task unless its class budget is
    /// spent. Exhausted tasks keep their classification and stay failed.
    pub fn schedule_if_allowed(
        &self,
        store: &mut StateStore,
        task_id: &TaskId,
        kind: FailureKind,
        retry_count: u32,
    ) -> Result<bool, StoreError> {
        if retry_count > self.retry_limit(kind) {
            warn!(
                task_id = %task_id,
                %kind,
                retry_count,
                "retry budget exhausted; task stays failed",
            );
            let id = task_id.clone();
            store.transact(move |state, _events| {
                if let Some(record) = state.tasks.get_mut(&id) {
                    record.failure_kind = Some(kind);
                }
                Ok(())
            })?;
            return Ok(false);
        }
        let ready_at = self.clock.now_ms() + self.backoff_delay_ms(retry_count);
        store.schedule_retry(task_id, ready_at, kind)?;
        info!(task_id = %task_id, %kind, retry_count, ready_at, "retry scheduled");
        Ok(true)
    }

    /// Reset tasks whose retry timestamps have passed. Returns the newly
    /// pending ids.
    pub fn check_due(&self, store: &mut StateStore) -> Result<Vec<TaskId>, StoreError> {
        store.take_due_retries(self.clock.now_ms())
    }

    /// Fail tasks stuck in `in_progress` beyond the stale timeout, then
    /// schedule them under the normal retry rules.
    pub fn check_stale(&self, store: &mut StateStore) -> Result<Vec<TaskId>, StoreError> {
        let now = self.clock.now_ms();
        let stale = store
            .state()
            .stale_in_progress(self.stale_timeout_seconds, now);
        for task_id in &stale {
            warn!(task_id = %task_id, timeout_seconds = self.stale_timeout_seconds, "task went stale");
            store.set_task_status(
                task_id,
                TaskStatus::Failed,
                None,
                Some("stale: no progress before timeout".into()),
                Some(FailureKind::Transient),
            )?;
            let retry_count = store
                .state()
                .tasks
                .get(task_id)
                .map(|r| r.retry_count)
                .unwrap_or(0);
            self.schedule_if_allowed(store, task_id, FailureKind::Transient, retry_count)?;
        }
        if !stale.is_empty() {
            store.append_event(zerg_core::Event::TasksStale {
                task_ids: stale.clone(),
                timeout_seconds: self.stale_timeout_seconds,
            })?;
        }
        Ok(stale)
    }

    /// Manual retry of one failed task.
    pub fn retry_task(&self, store: &mut StateStore, task_id: &TaskId) -> Result<bool, StoreError> {
        let failed = store
            .state()
            .tasks
            .get(task_id)
            .map(|r| r.status() == TaskStatus::Failed)
            .unwrap_or(false);
        if !failed {
            return Ok(false);
        }
        store.reset_task_to_pending(task_id)?;
        info!(task_id = %task_id, "task manually reset to pending");
        Ok(true)
    }

    /// Manual retry of every failed task. Returns the ids reset.
    pub fn retry_all_failed(&self, store: &mut StateStore) -> Result<Vec<TaskId>, StoreError> {
        let failed = store.state().tasks_by_status(TaskStatus::Failed);
        for task_id in &failed {
            store.reset_task_to_pending(task_id)?;
        }
        Ok(failed)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
