//! Bounded, append-only activity log.
//!
//! Holds the most recent [`ActivityLog::CAPACITY`] human-readable lines for
//! observers. Every line is mirrored into `tracing`. Nothing reads the log
//! back as control input.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Category of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Info,
    Success,
    Warning,
    Error,
    /// A self-critique question posed by the model.
    Question,
    /// The model's answer to its own question.
    Reflection,
    /// Mutation and deployment milestones.
    Evolution,
}

/// One line in the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub kind: LogKind,
    pub message: String,
}

/// Ring buffer of recent log lines with monotonic sequence numbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
}

impl ActivityLog {
    pub const CAPACITY: usize = 50;

    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line, evicting the oldest once full.
    pub fn record(&mut self, kind: LogKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            LogKind::Error => error!(kind = ?kind, "{message}"),
            LogKind::Warning => warn!(kind = ?kind, "{message}"),
            _ => info!(kind = ?kind, "{message}"),
        }

        self.next_seq += 1;
        if self.entries.len() == Self::CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            seq: self.next_seq,
            at: Utc::now(),
            kind,
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    /// Whether any retained line contains `needle` (case-insensitive).
    pub fn contains(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.entries
            .iter()
            .any(|e| e.message.to_lowercase().contains(&needle))
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_most_recent_entries() {
        let mut log = ActivityLog::new();
        for i in 0..(ActivityLog::CAPACITY + 7) {
            log.record(LogKind::Info, format!("line {i}"));
        }
        assert_eq!(log.len(), ActivityLog::CAPACITY);
        assert_eq!(log.entries().next().unwrap().message, "line 7");
        assert_eq!(log.last().unwrap().message, format!("line {}", ActivityLog::CAPACITY + 6));
    }

    #[test]
    fn sequence_numbers_are_monotonic_across_eviction() {
        let mut log = ActivityLog::new();
        for _ in 0..(ActivityLog::CAPACITY * 2) {
            log.record(LogKind::Warning, "tick");
        }
        let seqs: Vec<u64> = log.entries().map(|e| e.seq).collect();
        assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(*seqs.last().unwrap(), (ActivityLog::CAPACITY * 2) as u64);
    }

    #[test]
    fn contains_is_case_insensitive() {
        let mut log = ActivityLog::new();
        log.record(LogKind::Warning, "No optimizations found for a.ts");
        assert!(log.contains("no optimizations"));
        assert!(!log.contains("committed"));
    }
}
