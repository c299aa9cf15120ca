//! Configuration types.

pub mod config;

pub use config::{
    AutoSavepointPolicy, BoolLiterals, CompoundKind, CompoundSerialization, FailureStrategy,
    QueryErrorPolicy, StoreConfig, TypedDefaults, DEFAULT_NAME_PATTERN,
};
