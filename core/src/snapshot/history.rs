//! Append-only mutation history.
//!
//! Every mutating store operation, including restores, is recorded as a
//! `HistoryEntry` with a monotonically increasing sequence number. Entries
//! are never rewritten; when a retention cap is configured the oldest
//! entries are dropped first.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::namespace::key::Key;

// ---------------------------------------------------------------------------
// Source / HistoryOp
// ---------------------------------------------------------------------------

/// Who initiated a mutation or savepoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Direct API call.
    #[default]
    User,
    /// Command-language script.
    Query,
    /// Bulk import or other internal operation.
    System,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::User => write!(f, "user"),
            Source::Query => write!(f, "query"),
            Source::System => write!(f, "system"),
        }
    }
}

/// The kind of mutation recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOp {
    Set,
    Clear,
    Increment,
    Decrement,
    ListAppend,
    SetAppend,
    Import,
    Restore,
}

impl fmt::Display for HistoryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HistoryOp::Set => "set",
            HistoryOp::Clear => "clear",
            HistoryOp::Increment => "increment",
            HistoryOp::Decrement => "decrement",
            HistoryOp::ListAppend => "list_append",
            HistoryOp::SetAppend => "set_append",
            HistoryOp::Import => "import",
            HistoryOp::Restore => "restore",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// HistoryEntry
// ---------------------------------------------------------------------------

/// One recorded mutation. `key` is `None` for whole-store operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub operation: HistoryOp,
    pub key: Option<Key>,
    pub prior_value: Option<String>,
    pub new_value: Option<String>,
    pub source: Source,
}

/// The mutation-specific part of an entry, before sequencing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub operation: HistoryOp,
    pub key: Option<Key>,
    pub prior_value: Option<String>,
    pub new_value: Option<String>,
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Ordered mutation log with optional FIFO retention.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    next_sequence: u64,
    max_entries: Option<usize>,
}

impl History {
    pub fn new(max_entries: Option<usize>) -> Self {
        History {
            entries: VecDeque::new(),
            next_sequence: 0,
            max_entries,
        }
    }

    /// Append a change and return its sequence number.
    pub fn append(&mut self, change: Change, source: Source, now_ms: u64) -> u64 {
        let seq = self.next_sequence;
        self.entries.push_back(HistoryEntry {
            sequence: seq,
            timestamp_ms: now_ms,
            operation: change.operation,
            key: change.key,
            prior_value: change.prior_value,
            new_value: change.new_value,
            source,
        });
        self.next_sequence += 1;

        if let Some(max) = self.max_entries {
            while self.entries.len() > max {
                self.entries.pop_front();
            }
        }

        seq
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> &VecDeque<HistoryEntry> {
        &self.entries
    }

    /// Entries with a sequence number >= `sequence`.
    pub fn since(&self, sequence: u64) -> Vec<&HistoryEntry> {
        self.entries
            .iter()
            .filter(|e| e.sequence >= sequence)
            .collect()
    }

    pub fn for_key(&self, key: &Key) -> Vec<&HistoryEntry> {
        self.entries
            .iter()
            .filter(|e| e.key.as_ref() == Some(key))
            .collect()
    }

    /// The last `n` entries, oldest first.
    pub fn latest(&self, n: usize) -> Vec<&HistoryEntry> {
        let start = self.entries.len().saturating_sub(n);
        self.entries.range(start..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ever recorded, including evicted ones. Never decreases.
    pub fn total_recorded(&self) -> u64 {
        self.next_sequence
    }

    /// Serialize retained entries as JSON lines.
    pub fn to_json_lines(&self) -> String {
        self.entries
            .iter()
            .map(|e| serde_json::to_string(e).unwrap_or_default())
            .collect::<Vec<String>>()
            .join("\n")
    }
}
