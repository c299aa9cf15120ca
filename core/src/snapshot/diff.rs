//! Key-level diff between two mappings.
//!
//! Used to show what restoring a savepoint would change: keys the live
//! store gained since the savepoint, keys it lost, and keys whose value
//! differs.

use serde::Serialize;

use crate::namespace::key::Key;
use crate::namespace::store::Mapping;

// ---------------------------------------------------------------------------
// ValueChange
// ---------------------------------------------------------------------------

/// A key present on both sides with different values.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValueChange {
    pub key: Key,
    pub old_value: String,
    pub new_value: String,
}

// ---------------------------------------------------------------------------
// MappingDiff
// ---------------------------------------------------------------------------

/// Differences going from `old` to `new`. All lists are in key order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct MappingDiff {
    pub added: Vec<(Key, String)>,
    pub removed: Vec<(Key, String)>,
    pub changed: Vec<ValueChange>,
}

impl MappingDiff {
    pub fn compute(old: &Mapping, new: &Mapping) -> Self {
        let mut diff = MappingDiff::default();
        for (key, old_value) in old {
            match new.get(key) {
                None => diff.removed.push((key.clone(), old_value.clone())),
                Some(new_value) if new_value != old_value => diff.changed.push(ValueChange {
                    key: key.clone(),
                    old_value: old_value.clone(),
                    new_value: new_value.clone(),
                }),
                Some(_) => {}
            }
        }
        for (key, new_value) in new {
            if !old.contains_key(key) {
                diff.added.push((key.clone(), new_value.clone()));
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.added.is_empty() {
            parts.push(format!("{} key(s) added", self.added.len()));
        }
        if !self.removed.is_empty() {
            parts.push(format!("{} key(s) removed", self.removed.len()));
        }
        if !self.changed.is_empty() {
            parts.push(format!("{} key(s) changed", self.changed.len()));
        }
        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}
