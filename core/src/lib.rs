//! Scoped key-value store with typed values, a small command language and
//! savepoint-based versioning.
//!
//! ```text
//! let mut engine = Engine::new(StoreConfig::new(["env"]))?;
//! engine.run_script("set env:limit to 10; inc env:limit 5;");
//! assert_eq!(engine.store().get_raw("env:limit")?, Some("15"));
//! ```

pub mod cli;
pub mod codec;
pub mod dsl;
pub mod engine;
pub mod error;
pub mod namespace;
pub mod snapshot;
pub mod types;

pub use engine::Engine;
pub use error::{Result, StoreError};
pub use namespace::{ConflictPolicy, EventFilter, Key, Store};
pub use types::StoreConfig;
