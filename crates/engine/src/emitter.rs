// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded broadcast bus for domain events.
//!
//! Observers subscribe without the orchestrator holding references to
//! them; publication never blocks. Slow subscribers lag and lose old
//! events (their receiver reports the gap); they own their backpressure.

use tokio::sync::broadcast;
use zerg_core::Event;

const DEFAULT_CAPACITY: usize = 256;

/// Non-blocking broadcast of domain events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped silently when no one
    /// is listening.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
#[path = "emitter_tests.rs"]
mod tests;
