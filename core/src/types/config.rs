use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dsl::command::CommandKind;
use crate::error::ConfigError;
use crate::namespace::key::Key;

/// Identifier grammar used for scopes, and the default for names.
pub const DEFAULT_NAME_PATTERN: &str = r"[\p{L}_][\p{L}\p{N}_]*";

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// What a typed read does when the raw value cannot be decoded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    #[default]
    Throw,
    /// Log a warning and return the configured per-type default.
    LogAndReturnDefault,
    /// Return `Decoded::Failed` instead of an error.
    ReturnFailureMarker,
}

/// Fallback values used by `FailureStrategy::LogAndReturnDefault`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TypedDefaults {
    pub bool_value: bool,
    pub int_value: i64,
    pub double_value: f64,
}

impl Default for TypedDefaults {
    fn default() -> Self {
        TypedDefaults {
            bool_value: false,
            int_value: 0,
            double_value: 0.0,
        }
    }
}

/// Literals accepted as booleans. The first entry of each list is the
/// canonical encoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BoolLiterals {
    pub true_literals: Vec<String>,
    pub false_literals: Vec<String>,
}

impl Default for BoolLiterals {
    fn default() -> Self {
        BoolLiterals {
            true_literals: vec!["true".into()],
            false_literals: vec!["false".into()],
        }
    }
}

/// Encoding used for list and set values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompoundSerialization {
    Delimited {
        delimiter: char,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        escape: Option<char>,
    },
    JsonArray,
}

impl Default for CompoundSerialization {
    fn default() -> Self {
        CompoundSerialization::Delimited {
            delimiter: ',',
            escape: Some('\\'),
        }
    }
}

/// Compound shape of a key, used by `set key value` without `to`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompoundKind {
    List,
    Set,
}

/// How a script reacts to a failing statement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorPolicy {
    /// Stop at the first failure. Earlier statements stay applied.
    #[default]
    AbortRemaining,
    /// Record the failure and move on; failures are tolerated.
    SkipAndContinue,
    /// Run everything and report every failure.
    CollectAndReportAll,
}

/// Automatic savepoints taken before a script runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutoSavepointPolicy {
    pub enabled: bool,
    pub max_count: usize,
    pub exclude_noops: bool,
    pub prune_oldest: bool,
}

impl Default for AutoSavepointPolicy {
    fn default() -> Self {
        AutoSavepointPolicy {
            enabled: false,
            max_count: 10,
            exclude_noops: true,
            prune_oldest: true,
        }
    }
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

/// Immutable configuration handed to a store at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub allowed_scopes: BTreeSet<String>,
    pub name_pattern: String,
    pub failure_strategy: FailureStrategy,
    pub defaults: TypedDefaults,
    pub bool_literals: BoolLiterals,
    pub compound_serialization: CompoundSerialization,
    /// `scope:name` or `scope:*` mapped to the compound shape of the key.
    pub compound_keys: BTreeMap<String, CompoundKind>,
    /// One-way token → stored literal translation for the command language.
    pub enum_map: BTreeMap<String, String>,
    pub enum_case_sensitive: bool,
    pub enabled_commands: BTreeSet<CommandKind>,
    pub query_error_policy: QueryErrorPolicy,
    pub auto_savepoint: AutoSavepointPolicy,
    pub history_max_entries: Option<usize>,
    pub record_noop_clears: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            allowed_scopes: BTreeSet::new(),
            name_pattern: DEFAULT_NAME_PATTERN.into(),
            failure_strategy: FailureStrategy::default(),
            defaults: TypedDefaults::default(),
            bool_literals: BoolLiterals::default(),
            compound_serialization: CompoundSerialization::default(),
            compound_keys: BTreeMap::new(),
            enum_map: BTreeMap::new(),
            enum_case_sensitive: true,
            enabled_commands: CommandKind::ALL.iter().copied().collect(),
            query_error_policy: QueryErrorPolicy::default(),
            auto_savepoint: AutoSavepointPolicy::default(),
            history_max_entries: None,
            record_noop_clears: false,
        }
    }
}

impl StoreConfig {
    /// Default configuration restricted to the given scopes.
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StoreConfig {
            allowed_scopes: scopes.into_iter().map(Into::into).collect(),
            ..StoreConfig::default()
        }
    }

    pub fn with_failure_strategy(mut self, strategy: FailureStrategy) -> Self {
        self.failure_strategy = strategy;
        self
    }

    pub fn with_defaults(mut self, defaults: TypedDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_bool_literals(mut self, literals: BoolLiterals) -> Self {
        self.bool_literals = literals;
        self
    }

    pub fn with_name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = pattern.into();
        self
    }

    pub fn with_compound_serialization(mut self, serialization: CompoundSerialization) -> Self {
        self.compound_serialization = serialization;
        self
    }

    pub fn with_compound_key(mut self, key: impl Into<String>, kind: CompoundKind) -> Self {
        self.compound_keys.insert(key.into(), kind);
        self
    }

    pub fn with_enum(mut self, token: impl Into<String>, literal: impl Into<String>) -> Self {
        self.enum_map.insert(token.into(), literal.into());
        self
    }

    pub fn with_enum_case_sensitive(mut self, sensitive: bool) -> Self {
        self.enum_case_sensitive = sensitive;
        self
    }

    pub fn with_commands<I: IntoIterator<Item = CommandKind>>(mut self, commands: I) -> Self {
        self.enabled_commands = commands.into_iter().collect();
        self
    }

    pub fn with_query_error_policy(mut self, policy: QueryErrorPolicy) -> Self {
        self.query_error_policy = policy;
        self
    }

    pub fn with_auto_savepoint(mut self, policy: AutoSavepointPolicy) -> Self {
        self.auto_savepoint = policy;
        self
    }

    pub fn with_history_max_entries(mut self, max: usize) -> Self {
        self.history_max_entries = Some(max);
        self
    }

    pub fn with_record_noop_clears(mut self, record: bool) -> Self {
        self.record_noop_clears = record;
        self
    }

    /// Parse a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    /// Check the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_scopes.is_empty() {
            return Err(ConfigError::NoScopes);
        }
        let ident = anchored(DEFAULT_NAME_PATTERN)?;
        for scope in &self.allowed_scopes {
            if !ident.is_match(scope) {
                return Err(ConfigError::InvalidScope(scope.clone()));
            }
        }
        anchored(&self.name_pattern)?;

        let lits = &self.bool_literals;
        if lits.true_literals.is_empty() || lits.false_literals.is_empty() {
            return Err(ConfigError::InvalidBoolLiterals(
                "true and false literal lists must be non-empty".into(),
            ));
        }
        if let Some(both) = lits
            .true_literals
            .iter()
            .find(|t| lits.false_literals.contains(t))
        {
            return Err(ConfigError::InvalidBoolLiterals(format!(
                "'{}' is both true and false",
                both
            )));
        }

        if let CompoundSerialization::Delimited { delimiter, escape } = &self.compound_serialization {
            if Some(*delimiter) == *escape {
                return Err(ConfigError::InvalidDelimiter(
                    "delimiter and escape must differ".into(),
                ));
            }
        }

        for rule in self.compound_keys.keys() {
            let scope = rule.split(':').next().unwrap_or_default();
            if !rule.contains(':') || !self.allowed_scopes.contains(scope) {
                return Err(ConfigError::InvalidCompoundRule(rule.clone()));
            }
        }

        if !self.enum_case_sensitive {
            let mut folded: BTreeMap<String, (&String, &String)> = BTreeMap::new();
            for (token, literal) in &self.enum_map {
                let previous = folded.insert(token.to_lowercase(), (token, literal));
                if let Some((other, other_literal)) = previous {
                    if other_literal != literal {
                        return Err(ConfigError::EnumCollision(other.clone(), token.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Compound shape configured for `key`: exact rules win over `scope:*`.
    pub fn compound_kind_for(&self, key: &Key) -> Option<CompoundKind> {
        self.compound_keys
            .get(&key.to_string())
            .or_else(|| self.compound_keys.get(&format!("{}:*", key.scope())))
            .copied()
    }
}

/// Compile `pattern` so it must match a whole identifier.
pub(crate) fn anchored(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| ConfigError::InvalidNamePattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
