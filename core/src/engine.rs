//! Versioned store: a `Store` plus its savepoints and script runner.
//!
//! The engine is always live. Restoring a savepoint replaces the mapping in
//! place and the store keeps accepting mutations immediately afterwards.
//! Scripts run through `run_script`, which takes an automatic savepoint
//! first when the configured policy asks for one.

use tracing::{debug, info};

use crate::dsl::analyzer::Analyzer;
use crate::dsl::executor::{execute, PreparedScript, ScriptReport};
use crate::error::{Result, StoreError};
use crate::namespace::events::{EventFilter, EventRecord, SubscriptionHandle};
use crate::namespace::store::{IntoKey, Store};
use crate::snapshot::diff::MappingDiff;
use crate::snapshot::history::{History, HistoryEntry};
use crate::snapshot::now_ms;
use crate::snapshot::savepoint::{SaveOptions, Savepoint, SavepointInfo, SavepointManager};
use crate::types::config::{QueryErrorPolicy, StoreConfig};

#[derive(Debug)]
pub struct Engine {
    store: Store,
    savepoints: SavepointManager,
    analyzer: Analyzer,
}

impl Engine {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let store = Store::new(config)?;
        let analyzer = Analyzer::from_config(store.config())?;
        let savepoints = SavepointManager::new(store.config().auto_savepoint.clone());
        Ok(Engine {
            store,
            savepoints,
            analyzer,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn history(&self) -> &History {
        self.store.history()
    }

    /// Retained entries with a sequence number >= `sequence`.
    pub fn history_since(&self, sequence: u64) -> Vec<&HistoryEntry> {
        self.store.history().since(sequence)
    }

    pub fn history_for_key<K: IntoKey>(&self, key: K) -> Result<Vec<&HistoryEntry>> {
        self.store.history_for_key(key)
    }

    pub fn latest_history(&self, n: usize) -> Vec<&HistoryEntry> {
        self.store.history().latest(n)
    }

    // -------------------------------------------------------------------
    // Savepoints
    // -------------------------------------------------------------------

    /// Save the current mapping under `label`.
    pub fn save(&mut self, label: impl Into<String>) -> String {
        self.save_with(SaveOptions::new().label(label))
    }

    pub fn save_with(&mut self, options: SaveOptions) -> String {
        let id = self
            .savepoints
            .create_manual(self.store.snapshot(), options, now_ms());
        info!(%id, keys = self.store.len(), "savepoint created");
        id
    }

    /// Replace the mapping with the savepoint's snapshot.
    ///
    /// The savepoint is kept. Returns the number of keys whose value changed.
    pub fn restore(&mut self, id: &str) -> Result<usize> {
        let snapshot = self.find(id)?.snapshot.clone();
        let changed = self.store.restore_mapping(snapshot);
        info!(%id, changed, "savepoint restored");
        Ok(changed)
    }

    pub fn delete_savepoint(&mut self, id: &str) -> Result<SavepointInfo> {
        let removed = self
            .savepoints
            .remove(id)
            .ok_or_else(|| StoreError::UnknownSavepoint(id.to_string()))?;
        debug!(%id, "savepoint deleted");
        Ok(removed.info)
    }

    pub fn savepoint(&self, id: &str) -> Result<&SavepointInfo> {
        Ok(&self.find(id)?.info)
    }

    /// Every savepoint, in creation order.
    pub fn list_savepoints(&self) -> Vec<SavepointInfo> {
        self.savepoints.list()
    }

    /// Changes from the savepoint to the current mapping.
    pub fn diff_savepoint(&self, id: &str) -> Result<MappingDiff> {
        let savepoint = self.find(id)?;
        Ok(MappingDiff::compute(&savepoint.snapshot, &self.store.snapshot()))
    }

    fn find(&self, id: &str) -> Result<&Savepoint> {
        self.savepoints
            .get(id)
            .ok_or_else(|| StoreError::UnknownSavepoint(id.to_string()))
    }

    // -------------------------------------------------------------------
    // Scripts
    // -------------------------------------------------------------------

    /// Lex and analyze `script` without running it.
    pub fn prepare(&self, script: &str) -> PreparedScript {
        PreparedScript::prepare(script, &self.analyzer)
    }

    /// Run `script` under the configured error policy.
    pub fn run_script(&mut self, script: &str) -> ScriptReport {
        let policy = self.store.config().query_error_policy;
        self.run_script_with(script, policy)
    }

    pub fn run_script_with(&mut self, script: &str, policy: QueryErrorPolicy) -> ScriptReport {
        let prepared = self.prepare(script);
        let auto_savepoint = self.auto_savepoint(&prepared);
        let mut report = execute(&mut self.store, &prepared, policy);
        report.auto_savepoint = auto_savepoint;
        report
    }

    fn auto_savepoint(&mut self, prepared: &PreparedScript) -> Option<String> {
        let policy = self.savepoints.policy();
        if !policy.enabled {
            return None;
        }
        if policy.exclude_noops && prepared.is_noop() {
            debug!("script changes nothing, no automatic savepoint");
            return None;
        }
        self.savepoints
            .create_automatic(self.store.snapshot(), now_ms())
    }

    // -------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------

    pub fn subscribe<F>(&mut self, filter: EventFilter, listener: F) -> SubscriptionHandle
    where
        F: FnMut(&EventRecord) -> std::result::Result<(), String> + 'static,
    {
        self.store.subscribe(filter, listener)
    }

    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        self.store.unsubscribe(handle)
    }
}
