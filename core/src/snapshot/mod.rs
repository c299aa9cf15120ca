//! Versioning primitives: append-only history, savepoints and mapping
//! diffs.

pub mod diff;
pub mod history;
pub mod savepoint;

pub use diff::{MappingDiff, ValueChange};
pub use history::{Change, History, HistoryEntry, HistoryOp, Source};
pub use savepoint::{SaveOptions, Savepoint, SavepointInfo, SavepointKind, SavepointManager};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
