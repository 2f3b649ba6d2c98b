// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zerg-graph: Task graph parsing, validation, queries, and worker
//! assignment.

pub mod assign;
pub mod graph;
pub mod validate;

pub use assign::{AssignError, WorkerAssignment};
pub use graph::{GraphDoc, TaskGraph};
pub use validate::{GraphError, Violation, ViolationField};
