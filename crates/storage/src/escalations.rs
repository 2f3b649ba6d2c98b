// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Escalation persistence: worker-side writer, orchestrator-side monitor.
//!
//! Escalations live in `.zerg/state/escalations.json` as
//! `{"escalations": [...]}`; writes are atomic (tmp + rename) and
//! best-effort reads treat a corrupt file as empty.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use zerg_core::{Clock, Escalation, EscalationCategory, TaskId};

const ESCALATION_FILE: &str = "escalations.json";

#[derive(Debug, Error)]
pub enum EscalationError {
    #[error("escalation io error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("escalation serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EscalationDoc {
    #[serde(default)]
    escalations: Vec<Escalation>,
}

fn read_doc(path: &Path) -> EscalationDoc {
    let Ok(text) = std::fs::read_to_string(path) else {
        return EscalationDoc::default();
    };
    serde_json::from_str(&text).unwrap_or_default()
}

fn write_doc(path: &Path, doc: &EscalationDoc) -> Result<(), EscalationError> {
    let io_err = |source| EscalationError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(doc)?;
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)
}

/// Worker-side escalation writer.
pub struct EscalationWriter {
    worker_id: u32,
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl EscalationWriter {
    pub fn new(state_dir: &Path, worker_id: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            worker_id,
            path: state_dir.join(ESCALATION_FILE),
            clock,
        }
    }

    /// Append an escalation to the shared file.
    pub fn escalate(
        &self,
        task_id: &TaskId,
        category: EscalationCategory,
        message: impl Into<String>,
        context: HashMap<String, String>,
    ) -> Result<Escalation, EscalationError> {
        let escalation = Escalation {
            worker_id: self.worker_id,
            task_id: task_id.clone(),
            timestamp_ms: self.clock.now_ms(),
            category,
            message: message.into(),
            context,
            resolved: false,
        };
        let mut doc = read_doc(&self.path);
        doc.escalations.push(escalation.clone());
        write_doc(&self.path, &doc)?;
        info!(
            worker_id = self.worker_id,
            task_id = %escalation.task_id,
            category = %category,
            "worker escalated",
        );
        Ok(escalation)
    }
}

/// Orchestrator-side escalation reader and resolver.
pub struct EscalationMonitor {
    path: PathBuf,
}

impl EscalationMonitor {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(ESCALATION_FILE),
        }
    }

    pub fn read_all(&self) -> Vec<Escalation> {
        read_doc(&self.path).escalations
    }

    pub fn unresolved(&self) -> Vec<Escalation> {
        self.read_all().into_iter().filter(|e| !e.resolved).collect()
    }

    /// Mark a specific worker/task escalation resolved. Returns whether
    /// anything changed.
    pub fn resolve(&self, task_id: &TaskId, worker_id: u32) -> Result<bool, EscalationError> {
        let mut doc = read_doc(&self.path);
        let mut changed = false;
        for escalation in &mut doc.escalations {
            if escalation.task_id == *task_id
                && escalation.worker_id == worker_id
                && !escalation.resolved
            {
                escalation.resolved = true;
                changed = true;
            }
        }
        if changed {
            write_doc(&self.path, &doc)?;
        }
        Ok(changed)
    }

    /// Resolve everything. Returns the number resolved.
    pub fn resolve_all(&self) -> Result<usize, EscalationError> {
        let mut doc = read_doc(&self.path);
        let mut count = 0;
        for escalation in &mut doc.escalations {
            if !escalation.resolved {
                escalation.resolved = true;
                count += 1;
            }
        }
        if count > 0 {
            write_doc(&self.path, &doc)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
#[path = "escalations_tests.rs"]
mod tests;
