// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zerg-storage: Crash-safe shared state for a feature run.
//!
//! The authoritative snapshot lives at `.zerg/state/{feature}.json`, the
//! append-only event log at `.zerg/state/events.jsonl`. All mutations go
//! through [`StateStore`] under an exclusive lockfile.

pub mod escalations;
pub mod events;
pub mod lock;
pub mod metrics;
pub mod state_md;
pub mod store;

pub use escalations::{EscalationError, EscalationMonitor, EscalationWriter};
pub use events::{EventLog, EventLogError, EventRecord};
pub use lock::{validate_feature_name, LockError, Lockfile};
pub use metrics::FeatureMetrics;
pub use store::{DependencyChecker, FeatureState, NoDependencies, StateStore, StoreError};
