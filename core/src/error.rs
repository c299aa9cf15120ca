//! Error taxonomy for the store, codec, command language and versioning layer.
//!
//! Each layer owns a small `thiserror` enum; `StoreError` aggregates them so
//! callers of the high-level API only deal with one type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Key errors
// ---------------------------------------------------------------------------

/// Failures from parsing or validating a `scope:name` key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid key format '{0}': expected exactly one ':' between non-empty scope and name")]
    InvalidKeyFormat(String),
    #[error("unknown scope '{0}'")]
    UnknownScope(String),
    #[error("invalid name '{0}'")]
    InvalidName(String),
}

// ---------------------------------------------------------------------------
// Coercion errors
// ---------------------------------------------------------------------------

/// Failures converting a raw string to a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionError {
    #[error("'{0}' is not a boolean")]
    NotBool(String),
    #[error("'{0}' is not an integer")]
    NotInt(String),
    #[error("'{0}' is not a double")]
    NotDouble(String),
    #[error("'{0}' is not numeric")]
    NotNumeric(String),
    #[error("integer overflow applying {delta} to '{raw}'")]
    Overflow { raw: String, delta: String },
    #[error("'{raw}' is not a valid compound value: {reason}")]
    NotCompound { raw: String, reason: String },
}

// ---------------------------------------------------------------------------
// DSL errors
// ---------------------------------------------------------------------------

/// A character outside the token grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unexpected character '{character}' at position {position}")]
pub struct LexError {
    pub position: usize,
    pub character: char,
}

/// Statement-level validation failures raised by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("unknown scope '{0}'")]
    UnknownScope(String),
    #[error("'{command}' expects {expected}, got {found} operand(s)")]
    ArityError {
        command: String,
        expected: String,
        found: usize,
    },
    #[error("'{command}' expects {expected}, got '{found}'")]
    TypeMismatch {
        command: String,
        expected: String,
        found: String,
    },
    #[error("unknown enum token '{0}'")]
    UnknownEnum(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Rejected store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("at least one allowed scope is required")]
    NoScopes,
    #[error("scope '{0}' is not a valid identifier")]
    InvalidScope(String),
    #[error("invalid name pattern '{pattern}': {reason}")]
    InvalidNamePattern { pattern: String, reason: String },
    #[error("boolean literals: {0}")]
    InvalidBoolLiterals(String),
    #[error("delimited serialization: {0}")]
    InvalidDelimiter(String),
    #[error("compound key rule '{0}' does not name a configured scope")]
    InvalidCompoundRule(String),
    #[error("enum tokens '{0}' and '{1}' collide when matched case-insensitively")]
    EnumCollision(String, String),
    #[error("cannot parse configuration: {0}")]
    Parse(String),
    #[error("cannot read configuration: {0}")]
    Io(String),
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Top-level error for store and versioning operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown savepoint '{0}'")]
    UnknownSavepoint(String),
    #[error("conflict on existing key '{0}'")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
