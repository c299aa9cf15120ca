//! Scoped key parsing and validation.
//!
//! Keys look like `env:limit` or `query:mode`. The scope must come from the
//! configured allow-list and the name must match the identifier grammar,
//! which is unicode-aware (`été`, `_tmp`, `x2` are all valid names).

use std::collections::BTreeSet;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{ConfigError, KeyError};
use crate::types::config::{anchored, StoreConfig};

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// A `scope:name` key. Built by a `KeyValidator` or deserialized; stores
/// re-validate every key they are handed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    scope: String,
    name: String,
}

impl Key {
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.name)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Split `raw` into `(scope, name)` without consulting any configuration.
pub fn split_key(raw: &str) -> Result<(&str, &str), KeyError> {
    let mut parts = raw.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scope), Some(name), None) if !scope.is_empty() && !name.is_empty() => {
            Ok((scope, name))
        }
        _ => Err(KeyError::InvalidKeyFormat(raw.to_string())),
    }
}

// ---------------------------------------------------------------------------
// KeyValidator
// ---------------------------------------------------------------------------

/// Validates raw keys against the allowed scopes and name grammar.
#[derive(Debug, Clone)]
pub struct KeyValidator {
    scopes: BTreeSet<String>,
    name_pattern: Regex,
}

impl KeyValidator {
    pub fn new<I, S>(scopes: I, name_pattern: &str) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(KeyValidator {
            scopes: scopes.into_iter().map(Into::into).collect(),
            name_pattern: anchored(name_pattern)?,
        })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, ConfigError> {
        Self::new(config.allowed_scopes.iter().cloned(), &config.name_pattern)
    }

    /// Parse `raw` into a `Key`.
    ///
    /// Checks run in order: format, scope, name.
    pub fn parse(&self, raw: &str) -> Result<Key, KeyError> {
        let (scope, name) = split_key(raw)?;
        if !self.scopes.contains(scope) {
            return Err(KeyError::UnknownScope(scope.to_string()));
        }
        if !self.name_pattern.is_match(name) {
            return Err(KeyError::InvalidName(name.to_string()));
        }
        Ok(Key {
            scope: scope.to_string(),
            name: name.to_string(),
        })
    }

    /// Build a key from already separated parts.
    pub fn key(&self, scope: &str, name: &str) -> Result<Key, KeyError> {
        self.parse(&format!("{}:{}", scope, name))
    }

    pub fn allows_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }
}

// Keys deserialize from their `scope:name` text but carry no validator, so
// only the format is checked here; stores re-validate on every write.
impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let (scope, name) = split_key(&raw).map_err(serde::de::Error::custom)?;
        Ok(Key {
            scope: scope.to_string(),
            name: name.to_string(),
        })
    }
}
