//! Bounded ring of timestamped log lines.
//!
//! # Responsibilities
//! - Keep the most recent gateway output for late-joining observers
//! - Fan every new entry out to live subscribers
//!
//! # Design Decisions
//! - Fixed capacity, oldest entry evicted first
//! - Pushing never blocks on subscribers (broadcast channel, lagging receivers skip)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Default number of entries retained.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Broadcast channel capacity for live subscribers.
const CHANNEL_CAPACITY: usize = 1024;

/// Origin of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Stdout,
    Stderr,
    Error,
    Exit,
    Info,
}

/// A single captured line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
    pub line: String,
}

impl LogEntry {
    /// Create an entry stamped with the current time.
    pub fn new(kind: LogKind, line: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            line: line.into(),
        }
    }
}

/// Shared, cloneable handle to the log ring.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
    tx: broadcast::Sender<LogEntry>,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
            tx,
        }
    }

    /// Append a line, evicting the oldest entry when full.
    pub fn push(&self, kind: LogKind, line: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(kind, line);
        {
            let mut entries = self.lock();
            if entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }
        // No receivers is fine
        let _ = self.tx.send(entry.clone());
        entry
    }

    /// Copy of every retained entry, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Drop every retained entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Receive every entry pushed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        // A panic while holding the lock cannot leave the deque half-written
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let buffer = LogBuffer::new(3);
        for i in 0..5 {
            buffer.push(LogKind::Stdout, format!("line {}", i));
        }

        let lines: Vec<String> = buffer.snapshot().into_iter().map(|e| e.line).collect();
        assert_eq!(lines, vec!["line 2", "line 3", "line 4"]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn clear_empties_buffer() {
        let buffer = LogBuffer::new(10);
        buffer.push(LogKind::Info, "hello");
        assert!(!buffer.is_empty());

        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn subscribers_receive_new_entries() {
        let buffer = LogBuffer::new(10);
        let mut rx = buffer.subscribe();

        buffer.push(LogKind::Stderr, "boom");

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.kind, LogKind::Stderr);
        assert_eq!(entry.line, "boom");
    }

    #[test]
    fn entry_serializes_kind_lowercase() {
        let entry = LogEntry::new(LogKind::Exit, "done");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "exit");
        assert_eq!(json["line"], "done");
        assert!(json["timestamp"].is_string());
    }
}
