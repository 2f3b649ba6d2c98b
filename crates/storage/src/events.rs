// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL event log.
//!
//! Each line is `{"seq":N,"timestamp_ms":T,"event":{...}}`. Sequence
//! numbers are monotonically increasing and entries are never deleted;
//! the append is durable (fsync) before returning. Multiple processes
//! append under the store's exclusive lock, so the log re-scans its tail
//! before assigning a sequence number.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use zerg_core::Event;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event log io error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("event serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One durable log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub timestamp_ms: u64,
    pub event: Event,
}

/// Append-only event log over a JSONL file.
pub struct EventLog {
    path: PathBuf,
    /// Highest sequence number seen so far.
    last_seq: u64,
    /// Byte offset up to which the file has been scanned.
    scanned_offset: u64,
}

impl EventLog {
    /// Open (creating if needed) and scan for the current tail sequence.
    pub fn open(path: PathBuf) -> Result<Self, EventLogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| Self::io_err_at(&path, source))?;
        }
        let mut log = Self {
            path,
            last_seq: 0,
            scanned_offset: 0,
        };
        log.refresh()?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Scan any entries appended since the last scan (other processes
    /// append under the same store lock).
    pub fn refresh(&mut self) -> Result<(), EventLogError> {
        if !self.path.exists() {
            self.last_seq = 0;
            self.scanned_offset = 0;
            return Ok(());
        }
        let file = std::fs::File::open(&self.path).map_err(|source| self.io_err(source))?;
        let len = file
            .metadata()
            .map_err(|source| self.io_err(source))?
            .len();
        if len < self.scanned_offset {
            // Truncated externally; rescan from the top
            self.scanned_offset = 0;
            self.last_seq = 0;
        }
        if len == self.scanned_offset {
            return Ok(());
        }

        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(self.scanned_offset))
            .map_err(|source| self.io_err(source))?;

        let mut line = String::new();
        loop {
            line.clear();
            let bytes = match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => return Err(self.io_err(err)),
            };
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                match serde_json::from_str::<EventRecord>(trimmed) {
                    Ok(record) => self.last_seq = self.last_seq.max(record.seq),
                    Err(err) => {
                        // A torn tail write from a crash; stop before it so
                        // the next append overwrites nothing and seqs stay
                        // monotonic past the valid prefix.
                        warn!(
                            path = %self.path.display(),
                            offset = self.scanned_offset,
                            error = %err,
                            "corrupt event log tail entry",
                        );
                        break;
                    }
                }
            }
            self.scanned_offset += bytes as u64;
        }
        Ok(())
    }

    /// Append an event durably, returning its sequence number.
    pub fn append(&mut self, event: &Event, timestamp_ms: u64) -> Result<u64, EventLogError> {
        self.refresh()?;
        let seq = self.last_seq + 1;
        let record = EventRecord {
            seq,
            timestamp_ms,
            event: event.clone(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_err(source))?;
        file.write_all(&line).map_err(|source| self.io_err(source))?;
        file.sync_all().map_err(|source| self.io_err(source))?;

        self.last_seq = seq;
        self.scanned_offset += line.len() as u64;
        Ok(seq)
    }

    /// All valid entries, in order. Tolerates a torn final line.
    pub fn read_all(&self) -> Result<Vec<EventRecord>, EventLogError> {
        self.entries_after(0)
    }

    /// Entries with `seq > after`.
    pub fn entries_after(&self, after: u64) -> Result<Vec<EventRecord>, EventLogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path).map_err(|source| self.io_err(source))?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|source| self.io_err(source))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<EventRecord>(trimmed) {
                Ok(record) => {
                    if record.seq > after {
                        records.push(record);
                    }
                }
                Err(err) => {
                    warn!(
                        path = %self.path.display(),
                        error = %err,
                        "stopping replay at corrupt event log entry",
                    );
                    break;
                }
            }
        }
        Ok(records)
    }

    fn io_err(&self, source: std::io::Error) -> EventLogError {
        Self::io_err_at(&self.path, source)
    }

    fn io_err_at(path: &Path, source: std::io::Error) -> EventLogError {
        EventLogError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
