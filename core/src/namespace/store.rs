//! Scoped key-value store core.
//!
//! Values live in a `BTreeMap<Key, String>`; typed meaning exists only at
//! the accessors. Every mutation goes through `record`, which appends to
//! the history and notifies listeners, so nothing can change the mapping
//! without leaving an audit trail.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::codec::{compound_codec, CompoundCodec, Decoded, Number, TypedValue, ValueCodec};
use crate::error::{CoercionError, KeyError, Result, StoreError};
use crate::namespace::events::{EventBus, EventFilter, EventRecord, SubscriptionHandle};
use crate::namespace::key::{Key, KeyValidator};
use crate::snapshot::history::{Change, History, HistoryEntry, HistoryOp, Source};
use crate::snapshot::now_ms;
use crate::types::config::StoreConfig;

/// Snapshot of the whole mapping.
pub type Mapping = BTreeMap<Key, String>;

// ---------------------------------------------------------------------------
// Key arguments
// ---------------------------------------------------------------------------

/// Anything the store can turn into a key it accepts.
///
/// Raw strings and `Key` values alike are checked against this store's
/// allowed scopes and name grammar.
pub trait IntoKey {
    fn into_key(self, validator: &KeyValidator) -> std::result::Result<Key, KeyError>;
}

impl IntoKey for &str {
    fn into_key(self, validator: &KeyValidator) -> std::result::Result<Key, KeyError> {
        validator.parse(self)
    }
}

impl IntoKey for &String {
    fn into_key(self, validator: &KeyValidator) -> std::result::Result<Key, KeyError> {
        validator.parse(self)
    }
}

impl IntoKey for &Key {
    fn into_key(self, validator: &KeyValidator) -> std::result::Result<Key, KeyError> {
        validator.key(self.scope(), self.name())
    }
}

impl IntoKey for Key {
    fn into_key(self, validator: &KeyValidator) -> std::result::Result<Key, KeyError> {
        (&self).into_key(validator)
    }
}

// ---------------------------------------------------------------------------
// Bulk merge
// ---------------------------------------------------------------------------

/// How `append_map` treats keys that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    KeepExisting,
    Overwrite,
    /// Reject the whole merge on the first existing key.
    ErrorOnConflict,
}

/// Counts from a bulk merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    pub written: usize,
    pub kept: usize,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory store owning its mapping, history and listeners.
#[derive(Debug)]
pub struct Store {
    config: StoreConfig,
    keys: KeyValidator,
    values: ValueCodec,
    compound: Box<dyn CompoundCodec>,
    data: Mapping,
    history: History,
    events: EventBus,
    source: Source,
}

impl Store {
    /// Build an empty store. The configuration is validated first.
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Store {
            keys: KeyValidator::from_config(&config)?,
            values: ValueCodec::new(
                config.failure_strategy,
                config.defaults.clone(),
                config.bool_literals.clone(),
            ),
            compound: compound_codec(&config.compound_serialization),
            history: History::new(config.history_max_entries),
            data: BTreeMap::new(),
            events: EventBus::new(),
            source: Source::User,
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn validator(&self) -> &KeyValidator {
        &self.keys
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.values
    }

    pub fn compound(&self) -> &dyn CompoundCodec {
        self.compound.as_ref()
    }

    /// Parse a raw key against this store's configuration.
    pub fn key(&self, raw: &str) -> Result<Key> {
        Ok(self.keys.parse(raw)?)
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    pub fn get_raw<K: IntoKey>(&self, key: K) -> Result<Option<&str>> {
        let key = key.into_key(&self.keys)?;
        Ok(self.data.get(&key).map(String::as_str))
    }

    pub fn contains<K: IntoKey>(&self, key: K) -> Result<bool> {
        let key = key.into_key(&self.keys)?;
        Ok(self.data.contains_key(&key))
    }

    /// Typed read. `Ok(None)` when the key is absent.
    pub fn get_as<T: TypedValue, K: IntoKey>(&self, key: K) -> Result<Option<Decoded<T>>> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(self.values.decode_as::<T>(raw)?)),
            None => Ok(None),
        }
    }

    /// Decode a list value. Absent keys read as empty.
    pub fn get_list<K: IntoKey>(&self, key: K) -> Result<Vec<String>> {
        match self.get_raw(key)? {
            Some(raw) => Ok(self.compound.decode_list(raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Decode a set value, first occurrence order. Absent keys read as empty.
    pub fn get_set<K: IntoKey>(&self, key: K) -> Result<Vec<String>> {
        match self.get_raw(key)? {
            Some(raw) => Ok(self.compound.decode_set(raw)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Key, &str)> {
        self.data.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn keys_in_scope(&self, scope: &str) -> Vec<&Key> {
        self.data.keys().filter(|k| k.scope() == scope).collect()
    }

    /// Deep copy of the current mapping.
    pub fn snapshot(&self) -> Mapping {
        self.data.clone()
    }

    /// Raw string view for format adapters.
    pub fn export_raw(&self) -> BTreeMap<String, String> {
        self.data
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    // -------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------

    pub fn set<K: IntoKey>(&mut self, key: K, raw: impl Into<String>) -> Result<()> {
        let key = key.into_key(&self.keys)?;
        self.write(key, raw.into(), HistoryOp::Set);
        Ok(())
    }

    pub fn set_as<T: TypedValue, K: IntoKey>(&mut self, key: K, value: &T) -> Result<()> {
        let raw = self.values.encode(value);
        self.set(key, raw)
    }

    pub fn set_list<K: IntoKey>(&mut self, key: K, items: &[String]) -> Result<()> {
        let key = key.into_key(&self.keys)?;
        let raw = self.compound.encode_list(items)?;
        self.set(key, raw)
    }

    pub fn set_set<K: IntoKey>(&mut self, key: K, items: &[String]) -> Result<()> {
        let key = key.into_key(&self.keys)?;
        let raw = self.compound.encode_set(items)?;
        self.set(key, raw)
    }

    /// Remove a key, returning its previous value.
    ///
    /// Clearing an absent key changes nothing; it is recorded in the history
    /// only when `record_noop_clears` is configured.
    pub fn clear<K: IntoKey>(&mut self, key: K) -> Result<Option<String>> {
        let key = key.into_key(&self.keys)?;
        match self.data.remove(&key) {
            Some(prior) => {
                self.record(Change {
                    operation: HistoryOp::Clear,
                    key: Some(key),
                    prior_value: Some(prior.clone()),
                    new_value: None,
                });
                Ok(Some(prior))
            }
            None => {
                if self.config.record_noop_clears {
                    self.history.append(
                        Change {
                            operation: HistoryOp::Clear,
                            key: Some(key),
                            prior_value: None,
                            new_value: None,
                        },
                        self.source,
                        now_ms(),
                    );
                }
                Ok(None)
            }
        }
    }

    /// Remove every key matching `predicate`, one history entry per key.
    pub fn clear_where<P>(&mut self, predicate: P) -> usize
    where
        P: Fn(&Key) -> bool,
    {
        let doomed: Vec<Key> = self.data.keys().filter(|k| predicate(k)).cloned().collect();
        for key in &doomed {
            if let Some(prior) = self.data.remove(key) {
                self.record(Change {
                    operation: HistoryOp::Clear,
                    key: Some(key.clone()),
                    prior_value: Some(prior),
                    new_value: None,
                });
            }
        }
        doomed.len()
    }

    /// Remove every key in `scope`.
    pub fn clear_scope(&mut self, scope: &str) -> Result<usize> {
        if !self.keys.allows_scope(scope) {
            return Err(KeyError::UnknownScope(scope.to_string()).into());
        }
        Ok(self.clear_where(|k| k.scope() == scope))
    }

    /// Merge external pairs. All keys are validated, and conflicts checked,
    /// before anything is written.
    pub fn append_map<I, K, V>(&mut self, entries: I, policy: ConflictPolicy) -> Result<MergeSummary>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut plan: Vec<(Key, String)> = Vec::new();
        let mut planned: HashSet<Key> = HashSet::new();
        let mut summary = MergeSummary::default();

        for (raw_key, value) in entries {
            let key = self.keys.parse(raw_key.as_ref())?;
            let exists = self.data.contains_key(&key) || planned.contains(&key);
            match (exists, policy) {
                (true, ConflictPolicy::ErrorOnConflict) => {
                    return Err(StoreError::Conflict(key.to_string()));
                }
                (true, ConflictPolicy::KeepExisting) => summary.kept += 1,
                _ => {
                    planned.insert(key.clone());
                    plan.push((key, value.into()));
                }
            }
        }

        for (key, value) in plan {
            self.write(key, value, HistoryOp::Import);
            summary.written += 1;
        }
        debug!(written = summary.written, kept = summary.kept, ?policy, "merged entries");
        Ok(summary)
    }

    /// Bulk load from a format adapter, recorded with source `system`.
    pub fn import_raw<I, K, V>(&mut self, entries: I, policy: ConflictPolicy) -> Result<MergeSummary>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let previous = self.swap_source(Source::System);
        let result = self.append_map(entries, policy);
        self.swap_source(previous);
        result
    }

    /// Add `amount` to a numeric value. Absent keys count as zero.
    pub fn increment<K: IntoKey>(&mut self, key: K, amount: impl Into<Number>) -> Result<String> {
        self.transform(key, amount.into(), HistoryOp::Increment)
    }

    pub fn decrement<K: IntoKey>(&mut self, key: K, amount: impl Into<Number>) -> Result<String> {
        let amount = amount.into();
        let negated = amount.checked_neg().ok_or_else(|| CoercionError::Overflow {
            raw: "0".into(),
            delta: format!("-{}", amount),
        })?;
        self.transform(key, negated, HistoryOp::Decrement)
    }

    /// Append to a list value, returning the new raw value.
    pub fn list_append<K: IntoKey>(&mut self, key: K, item: impl Into<String>) -> Result<String> {
        let key = key.into_key(&self.keys)?;
        let mut items = match self.data.get(&key) {
            Some(raw) => self.compound.decode_list(raw)?,
            None => Vec::new(),
        };
        items.push(item.into());
        let raw = self.compound.encode_list(&items)?;
        self.write(key, raw.clone(), HistoryOp::ListAppend);
        Ok(raw)
    }

    /// Add to a set value unless already present, returning the new raw value.
    pub fn set_append<K: IntoKey>(&mut self, key: K, item: impl Into<String>) -> Result<String> {
        let key = key.into_key(&self.keys)?;
        let mut items = match self.data.get(&key) {
            Some(raw) => self.compound.decode_set(raw)?,
            None => Vec::new(),
        };
        items.push(item.into());
        let raw = self.compound.encode_set(&items)?;
        self.write(key, raw.clone(), HistoryOp::SetAppend);
        Ok(raw)
    }

    // -------------------------------------------------------------------
    // History and events
    // -------------------------------------------------------------------

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_for_key<K: IntoKey>(&self, key: K) -> Result<Vec<&HistoryEntry>> {
        let key = key.into_key(&self.keys)?;
        Ok(self.history.for_key(&key))
    }

    pub fn subscribe<F>(&mut self, filter: EventFilter, listener: F) -> SubscriptionHandle
    where
        F: FnMut(&EventRecord) -> std::result::Result<(), String> + 'static,
    {
        self.events.subscribe(filter, listener)
    }

    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        self.events.unsubscribe(handle)
    }

    // -------------------------------------------------------------------
    // Crate-internal
    // -------------------------------------------------------------------

    /// Replace the whole mapping with `mapping`.
    ///
    /// Records one keyless `Restore` entry and notifies listeners of every
    /// key whose value differs. Returns the number of changed keys.
    pub(crate) fn restore_mapping(&mut self, mapping: Mapping) -> usize {
        let mut changed: Vec<(Key, Option<String>)> = Vec::new();
        for (key, value) in &mapping {
            if self.data.get(key) != Some(value) {
                changed.push((key.clone(), Some(value.clone())));
            }
        }
        for key in self.data.keys() {
            if !mapping.contains_key(key) {
                changed.push((key.clone(), None));
            }
        }
        changed.sort_by(|a, b| a.0.cmp(&b.0));

        self.data = mapping;
        self.history.append(
            Change {
                operation: HistoryOp::Restore,
                key: None,
                prior_value: None,
                new_value: None,
            },
            self.source,
            now_ms(),
        );
        for (key, new_value) in &changed {
            self.events.dispatch(&EventRecord {
                key: key.clone(),
                operation: HistoryOp::Restore,
                new_value: new_value.clone(),
                source: self.source,
            });
        }
        debug!(changed = changed.len(), "restored mapping");
        changed.len()
    }

    /// Set the source attributed to subsequent mutations, returning the
    /// previous one.
    pub(crate) fn swap_source(&mut self, source: Source) -> Source {
        std::mem::replace(&mut self.source, source)
    }

    // -------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------

    fn transform<K: IntoKey>(&mut self, key: K, delta: Number, op: HistoryOp) -> Result<String> {
        let key = key.into_key(&self.keys)?;
        let current = self.data.get(&key).map(String::as_str).unwrap_or("0");
        let next = self.values.transform_numeric(current, delta)?;
        self.write(key, next.clone(), op);
        Ok(next)
    }

    fn write(&mut self, key: Key, value: String, op: HistoryOp) {
        let prior = self.data.insert(key.clone(), value.clone());
        self.record(Change {
            operation: op,
            key: Some(key),
            prior_value: prior,
            new_value: Some(value),
        });
    }

    fn record(&mut self, change: Change) {
        let event = change.key.clone().map(|key| EventRecord {
            key,
            operation: change.operation,
            new_value: change.new_value.clone(),
            source: self.source,
        });
        debug!(
            op = %change.operation,
            key = ?change.key.as_ref().map(Key::to_string),
            source = %self.source,
            "store mutation"
        );
        self.history.append(change, self.source, now_ms());
        if let Some(event) = event {
            self.events.dispatch(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::types::config::{CompoundSerialization, FailureStrategy};

    fn store() -> Store {
        Store::new(StoreConfig::new(["env", "query"])).unwrap()
    }

    #[test]
    fn new_rejects_invalid_config() {
        assert!(matches!(
            Store::new(StoreConfig::default()),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn set_and_get() {
        let mut s = store();
        s.set("env:limit", "10").unwrap();
        assert_eq!(s.get_raw("env:limit").unwrap(), Some("10"));
        assert!(s.contains("env:limit").unwrap());
        assert_eq!(s.get_raw("env:other").unwrap(), None);
    }

    #[test]
    fn unknown_scope_leaves_store_unchanged() {
        let mut s = store();
        s.set("env:a", "1").unwrap();
        let before = s.snapshot();
        let history_before = s.history().len();

        let unknown = |r: Result<_>| {
            matches!(r, Err(StoreError::Key(KeyError::UnknownScope(ref sc))) if sc == "prod")
        };
        assert!(unknown(s.set("prod:a", "1").map(|_| ())));
        assert!(unknown(s.clear("prod:a").map(|_| ())));
        assert!(unknown(s.increment("prod:a", 1).map(|_| ())));
        assert!(unknown(s.decrement("prod:a", 1).map(|_| ())));
        assert!(unknown(s.list_append("prod:a", "x").map(|_| ())));
        assert!(unknown(s.set_append("prod:a", "x").map(|_| ())));
        assert!(unknown(s.clear_scope("prod").map(|_| ())));
        assert!(unknown(
            s.append_map([("env:b", "2"), ("prod:a", "1")], ConflictPolicy::Overwrite)
                .map(|_| ())
        ));

        assert_eq!(s.snapshot(), before);
        assert_eq!(s.history().len(), history_before);
    }

    #[test]
    fn foreign_key_checked_against_scopes() {
        let other = Store::new(StoreConfig::new(["prod"])).unwrap();
        let key = other.key("prod:a").unwrap();
        let mut s = store();
        assert!(matches!(
            s.set(&key, "1"),
            Err(StoreError::Key(KeyError::UnknownScope(_)))
        ));
    }

    #[test]
    fn deserialized_key_name_is_revalidated() {
        let key: Key = serde_json::from_str("\"env:9-bad name\"").unwrap();
        let mut s = store();
        assert!(matches!(
            s.set(&key, "1"),
            Err(StoreError::Key(KeyError::InvalidName(_)))
        ));
        assert!(s.export_raw().is_empty());

        let good: Key = serde_json::from_str("\"env:limit\"").unwrap();
        s.set(good, "5").unwrap();
        assert_eq!(s.get_raw("env:limit").unwrap(), Some("5"));
    }

    #[test]
    fn set_records_prior_and_new() {
        let mut s = store();
        s.set("env:a", "1").unwrap();
        s.set("env:a", "2").unwrap();
        let last = &s.history().entries()[1];
        assert_eq!(last.operation, HistoryOp::Set);
        assert_eq!(last.prior_value.as_deref(), Some("1"));
        assert_eq!(last.new_value.as_deref(), Some("2"));
        assert_eq!(last.source, Source::User);
    }

    #[test]
    fn typed_round_trip_through_store() {
        let mut s = store();
        s.set_as("env:flag", &true).unwrap();
        s.set_as("env:count", &42i64).unwrap();
        s.set_as("env:ratio", &0.25f64).unwrap();
        assert_eq!(s.get_raw("env:flag").unwrap(), Some("true"));
        assert_eq!(s.get_as::<bool, _>("env:flag").unwrap(), Some(Decoded::Value(true)));
        assert_eq!(s.get_as::<i64, _>("env:count").unwrap(), Some(Decoded::Value(42)));
        assert_eq!(s.get_as::<f64, _>("env:ratio").unwrap(), Some(Decoded::Value(0.25)));
        assert_eq!(s.get_as::<i64, _>("env:missing").unwrap(), None);
    }

    #[test]
    fn typed_read_follows_failure_strategy() {
        let mut s = store();
        s.set("env:a", "blue").unwrap();
        assert!(matches!(
            s.get_as::<i64, _>("env:a"),
            Err(StoreError::Coercion(CoercionError::NotInt(_)))
        ));

        let mut m = Store::new(
            StoreConfig::new(["env"]).with_failure_strategy(FailureStrategy::ReturnFailureMarker),
        )
        .unwrap();
        m.set("env:a", "blue").unwrap();
        assert!(m.get_as::<i64, _>("env:a").unwrap().unwrap().is_failed());
    }

    #[test]
    fn clear_present_and_absent() {
        let mut s = store();
        s.set("env:a", "1").unwrap();
        assert_eq!(s.clear("env:a").unwrap(), Some("1".into()));
        assert_eq!(s.clear("env:a").unwrap(), None);
        assert_eq!(s.history().len(), 2);

        let mut r = Store::new(StoreConfig::new(["env"]).with_record_noop_clears(true)).unwrap();
        assert_eq!(r.clear("env:a").unwrap(), None);
        assert_eq!(r.history().len(), 1);
        assert_eq!(r.history().entries()[0].prior_value, None);
    }

    #[test]
    fn clear_where_one_entry_per_key() {
        let mut s = store();
        s.set("env:a", "1").unwrap();
        s.set("env:b", "2").unwrap();
        s.set("query:a", "3").unwrap();
        let seq = s.history().total_recorded();

        assert_eq!(s.clear_where(|k| k.scope() == "env"), 2);
        assert_eq!(s.len(), 1);
        let cleared: Vec<String> = s
            .history()
            .since(seq)
            .iter()
            .map(|e| e.key.as_ref().unwrap().to_string())
            .collect();
        assert_eq!(cleared, vec!["env:a", "env:b"]);
    }

    #[test]
    fn append_map_keep_existing() {
        let mut s = store();
        s.set("env:x", "0").unwrap();
        let summary = s
            .append_map([("env:x", "1"), ("env:y", "2")], ConflictPolicy::KeepExisting)
            .unwrap();
        assert_eq!(summary, MergeSummary { written: 1, kept: 1 });
        assert_eq!(s.get_raw("env:x").unwrap(), Some("0"));
        assert_eq!(s.get_raw("env:y").unwrap(), Some("2"));
    }

    #[test]
    fn append_map_overwrite() {
        let mut s = store();
        s.set("env:x", "0").unwrap();
        s.append_map([("env:x", "1")], ConflictPolicy::Overwrite).unwrap();
        assert_eq!(s.get_raw("env:x").unwrap(), Some("1"));
        assert_eq!(s.history().entries()[1].operation, HistoryOp::Import);
    }

    #[test]
    fn append_map_error_on_conflict_is_all_or_nothing() {
        let mut s = store();
        s.set("env:x", "0").unwrap();
        let err = s
            .append_map(
                [("env:a", "1"), ("env:x", "1"), ("env:b", "2")],
                ConflictPolicy::ErrorOnConflict,
            )
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict("env:x".into()));
        assert_eq!(s.len(), 1);
        assert!(!s.contains("env:a").unwrap());
    }

    #[test]
    fn append_map_duplicate_in_batch_conflicts() {
        let mut s = store();
        assert!(s
            .append_map([("env:a", "1"), ("env:a", "2")], ConflictPolicy::ErrorOnConflict)
            .is_err());
        assert!(s.is_empty());
    }

    #[test]
    fn import_and_export_raw() {
        let mut s = store();
        let mut input = BTreeMap::new();
        input.insert("env:a".to_string(), "1".to_string());
        input.insert("query:b".to_string(), "x".to_string());
        s.import_raw(input.clone(), ConflictPolicy::Overwrite).unwrap();
        assert_eq!(s.export_raw(), input);
        assert!(s.history().entries().iter().all(|e| e.source == Source::System));
        s.set("env:c", "2").unwrap();
        assert_eq!(s.history().entries()[2].source, Source::User);
    }

    #[test]
    fn increment_and_decrement() {
        let mut s = store();
        s.set("env:n", "10").unwrap();
        assert_eq!(s.increment("env:n", 5).unwrap(), "15");
        assert_eq!(s.decrement("env:n", 20).unwrap(), "-5");
        assert_eq!(s.increment("env:n", 0.5).unwrap(), "-4.5");
        assert_eq!(s.increment("env:fresh", 3).unwrap(), "3");
        assert_eq!(s.history().entries()[1].operation, HistoryOp::Increment);
        assert_eq!(s.history().entries()[2].operation, HistoryOp::Decrement);
    }

    #[test]
    fn increment_not_numeric_leaves_store_unchanged() {
        let mut s = store();
        s.set("env:n", "blue").unwrap();
        let len = s.history().len();
        assert_eq!(
            s.increment("env:n", 1),
            Err(StoreError::Coercion(CoercionError::NotNumeric("blue".into())))
        );
        assert_eq!(s.get_raw("env:n").unwrap(), Some("blue"));
        assert_eq!(s.history().len(), len);
    }

    #[test]
    fn list_and_set_append() {
        let mut s = store();
        s.list_append("env:l", "a").unwrap();
        s.list_append("env:l", "a").unwrap();
        assert_eq!(s.get_list("env:l").unwrap(), vec!["a", "a"]);

        s.set_append("env:s", "blue").unwrap();
        s.set_append("env:s", "blue").unwrap();
        s.set_append("env:s", "red").unwrap();
        assert_eq!(s.get_set("env:s").unwrap(), vec!["blue", "red"]);
    }

    #[test]
    fn json_array_compound_values() {
        let mut s = Store::new(
            StoreConfig::new(["env"]).with_compound_serialization(CompoundSerialization::JsonArray),
        )
        .unwrap();
        s.set_list("env:l", &["a".to_string(), "b,c".to_string()]).unwrap();
        assert_eq!(s.get_raw("env:l").unwrap(), Some(r#"["a","b,c"]"#));
        s.list_append("env:l", "d").unwrap();
        assert_eq!(s.get_list("env:l").unwrap(), vec!["a", "b,c", "d"]);
    }

    #[test]
    fn unescaped_delimiter_item_rejected() {
        let mut s = Store::new(StoreConfig::new(["env"]).with_compound_serialization(
            CompoundSerialization::Delimited {
                delimiter: ',',
                escape: None,
            },
        ))
        .unwrap();
        let history_before = s.history().len();
        assert!(matches!(
            s.set_list("env:l", &["a,b".to_string()]),
            Err(StoreError::Coercion(CoercionError::NotCompound { .. }))
        ));
        assert!(s.set_set("env:s", &["x,y".to_string()]).is_err());
        assert_eq!(s.get_raw("env:l").unwrap(), None);

        s.list_append("env:l", "a").unwrap();
        assert!(s.list_append("env:l", "b,c").is_err());
        assert!(s.set_append("env:s", "b,c").is_err());
        assert_eq!(s.get_list("env:l").unwrap(), vec!["a"]);
        assert_eq!(s.history().len(), history_before + 1);
    }

    #[test]
    fn append_to_corrupt_compound_fails_cleanly() {
        let mut s = Store::new(
            StoreConfig::new(["env"]).with_compound_serialization(CompoundSerialization::JsonArray),
        )
        .unwrap();
        s.set("env:l", "not a list").unwrap();
        assert!(s.list_append("env:l", "x").is_err());
        assert_eq!(s.get_raw("env:l").unwrap(), Some("not a list"));
    }

    #[test]
    fn events_dispatched_on_mutation() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut s = store();
        let sink = Rc::clone(&seen);
        s.subscribe(EventFilter::Scope("env".into()), move |e| {
            sink.borrow_mut()
                .push((e.key.to_string(), e.operation, e.new_value.clone()));
            Ok(())
        });
        s.set("env:a", "1").unwrap();
        s.set("query:a", "1").unwrap();
        s.clear("env:a").unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![
                ("env:a".to_string(), HistoryOp::Set, Some("1".to_string())),
                ("env:a".to_string(), HistoryOp::Clear, None),
            ]
        );
    }

    #[test]
    fn listener_failure_does_not_abort_mutation() {
        let mut s = store();
        s.subscribe(EventFilter::AllChanges, |_| Err("listener down".into()));
        s.set("env:a", "1").unwrap();
        assert_eq!(s.get_raw("env:a").unwrap(), Some("1"));
    }

    #[test]
    fn restore_mapping_reports_changes() {
        let mut s = store();
        s.set("env:a", "1").unwrap();
        s.set("env:b", "2").unwrap();
        let snap = s.snapshot();
        s.set("env:a", "9").unwrap();
        s.clear("env:b").unwrap();
        s.set("env:c", "3").unwrap();

        let changed = s.restore_mapping(snap.clone());
        assert_eq!(changed, 3);
        assert_eq!(s.snapshot(), snap);
        let last = s.history().entries().back().unwrap();
        assert_eq!(last.operation, HistoryOp::Restore);
        assert!(last.key.is_none());
    }

    #[test]
    fn keys_in_scope_lists_only_that_scope() {
        let mut s = store();
        s.set("env:a", "1").unwrap();
        s.set("query:b", "1").unwrap();
        let keys: Vec<String> = s.keys_in_scope("env").iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["env:a"]);
    }
}
