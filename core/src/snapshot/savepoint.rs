//! Savepoints: deep copies of the store mapping that can be restored later.
//!
//! `SavepointManager` keeps savepoints in creation order. Manual savepoints
//! live until deleted. Automatic ones are bounded by the configured policy:
//! at capacity the oldest automatic savepoint is evicted, or the new one is
//! skipped when pruning is disabled.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use ulid::Ulid;

use super::history::Source;
use crate::namespace::store::Mapping;
use crate::types::config::AutoSavepointPolicy;

/// Label given to savepoints taken before a script runs.
pub const AUTO_LABEL: &str = "before query";

// ---------------------------------------------------------------------------
// SavepointKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SavepointKind {
    Manual,
    Automatic,
}

impl fmt::Display for SavepointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SavepointKind::Manual => write!(f, "manual"),
            SavepointKind::Automatic => write!(f, "automatic"),
        }
    }
}

// ---------------------------------------------------------------------------
// Savepoint
// ---------------------------------------------------------------------------

/// Descriptive part of a savepoint, without the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavepointInfo {
    pub id: String,
    pub label: Option<String>,
    pub timestamp_ms: u64,
    pub kind: SavepointKind,
    pub source: Source,
    pub metadata: BTreeMap<String, String>,
    pub key_count: usize,
}

/// A savepoint and the mapping captured when it was created.
#[derive(Debug, Clone)]
pub struct Savepoint {
    pub info: SavepointInfo,
    pub snapshot: Mapping,
}

/// Options for a manual savepoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    pub label: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub source: Option<Source>,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Override the default `user` source.
    pub fn source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }
}

// ---------------------------------------------------------------------------
// SavepointManager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SavepointManager {
    savepoints: Vec<Savepoint>,
    policy: AutoSavepointPolicy,
}

impl SavepointManager {
    pub fn new(policy: AutoSavepointPolicy) -> Self {
        SavepointManager {
            savepoints: Vec::new(),
            policy,
        }
    }

    /// Store a manual savepoint and return its id.
    pub fn create_manual(&mut self, snapshot: Mapping, options: SaveOptions, now_ms: u64) -> String {
        let source = options.source.unwrap_or(Source::User);
        self.push(
            snapshot,
            SavepointKind::Manual,
            source,
            options.label,
            options.metadata,
            now_ms,
        )
    }

    /// Store an automatic savepoint if the policy allows one.
    ///
    /// Returns `None` when automatic savepoints are disabled, or when the
    /// policy is at capacity and pruning is off.
    pub fn create_automatic(&mut self, snapshot: Mapping, now_ms: u64) -> Option<String> {
        if !self.policy.enabled || self.policy.max_count == 0 {
            return None;
        }
        if self.automatic_count() >= self.policy.max_count {
            if !self.policy.prune_oldest {
                debug!(max = self.policy.max_count, "automatic savepoint limit reached, skipping");
                return None;
            }
            while self.automatic_count() >= self.policy.max_count {
                self.evict_oldest_automatic();
            }
        }
        Some(self.push(
            snapshot,
            SavepointKind::Automatic,
            Source::Query,
            Some(AUTO_LABEL.to_string()),
            BTreeMap::new(),
            now_ms,
        ))
    }

    pub fn get(&self, id: &str) -> Option<&Savepoint> {
        self.savepoints.iter().find(|sp| sp.info.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Savepoint> {
        let pos = self.savepoints.iter().position(|sp| sp.info.id == id)?;
        Some(self.savepoints.remove(pos))
    }

    /// Info for every savepoint, oldest first.
    pub fn list(&self) -> Vec<SavepointInfo> {
        self.savepoints.iter().map(|sp| sp.info.clone()).collect()
    }

    pub fn automatic_count(&self) -> usize {
        self.savepoints
            .iter()
            .filter(|sp| sp.info.kind == SavepointKind::Automatic)
            .count()
    }

    pub fn count(&self) -> usize {
        self.savepoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.savepoints.is_empty()
    }

    pub fn policy(&self) -> &AutoSavepointPolicy {
        &self.policy
    }

    fn evict_oldest_automatic(&mut self) {
        if let Some(pos) = self
            .savepoints
            .iter()
            .position(|sp| sp.info.kind == SavepointKind::Automatic)
        {
            let evicted = self.savepoints.remove(pos);
            debug!(id = %evicted.info.id, "evicted automatic savepoint");
        }
    }

    fn push(
        &mut self,
        snapshot: Mapping,
        kind: SavepointKind,
        source: Source,
        label: Option<String>,
        metadata: BTreeMap<String, String>,
        now_ms: u64,
    ) -> String {
        let id = Ulid::new().to_string();
        debug!(%id, %kind, %source, keys = snapshot.len(), "savepoint stored");
        self.savepoints.push(Savepoint {
            info: SavepointInfo {
                id: id.clone(),
                label,
                timestamp_ms: now_ms,
                kind,
                source,
                metadata,
                key_count: snapshot.len(),
            },
            snapshot,
        });
        id
    }
}
