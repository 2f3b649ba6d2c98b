// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ephemeral local port reservation.
//!
//! `allocate_one` probes candidates by binding `127.0.0.1` (SO_REUSEADDR
//! off, the std default) before reserving them internally. The probe is
//! not a guarantee (an external process can grab the port later), so
//! callers tolerate a bind failure at use time by releasing and retrying.

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("no free port in range [{range_start}, {range_end}]")]
    Exhausted { range_start: u16, range_end: u16 },
    #[error("port {0} is not in the allocator's range")]
    OutOfRange(u16),
}

/// Reserves local ports out of a configured range.
#[derive(Debug)]
pub struct PortAllocator {
    range_start: u16,
    range_end: u16,
    allocated: BTreeSet<u16>,
    /// Rotates so released ports are not immediately re-probed.
    next_candidate: u16,
}

impl PortAllocator {
    pub fn new(range_start: u16, range_end: u16) -> Self {
        Self {
            range_start,
            range_end,
            allocated: BTreeSet::new(),
            next_candidate: range_start,
        }
    }

    /// Probe whether a port is currently bindable. Advisory only.
    pub fn is_available(port: u16) -> bool {
        TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)).is_ok()
    }

    /// Reserve one free port.
    pub fn allocate_one(&mut self) -> Result<u16, PortError> {
        let span = u32::from(self.range_end) - u32::from(self.range_start) + 1;
        let mut candidate = self.next_candidate;
        for _ in 0..span {
            if !self.allocated.contains(&candidate) && Self::is_available(candidate) {
                self.allocated.insert(candidate);
                self.next_candidate = self.bump(candidate);
                return Ok(candidate);
            }
            candidate = self.bump(candidate);
        }
        Err(PortError::Exhausted {
            range_start: self.range_start,
            range_end: self.range_end,
        })
    }

    /// Release a reservation. Unknown ports are ignored; out-of-range
    /// ports are an error.
    pub fn release(&mut self, port: u16) -> Result<(), PortError> {
        if port < self.range_start || port > self.range_end {
            return Err(PortError::OutOfRange(port));
        }
        self.allocated.remove(&port);
        Ok(())
    }

    pub fn release_all(&mut self) {
        self.allocated.clear();
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    /// Remaining capacity of the range (reservations only; external
    /// binds are discovered at probe time).
    pub fn available_count(&self) -> usize {
        let span = usize::from(self.range_end - self.range_start) + 1;
        span - self.allocated.len()
    }

    pub fn is_allocated(&self, port: u16) -> bool {
        self.allocated.contains(&port)
    }

    fn bump(&self, port: u16) -> u16 {
        if port >= self.range_end {
            self.range_start
        } else {
            port + 1
        }
    }
}

#[cfg(test)]
#[path = "ports_tests.rs"]
mod tests;
