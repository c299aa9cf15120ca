//! Scoped keys and the store that holds them.
//!
//! Keys are `scope:name` pairs checked against a configured allow-list.
//! The store maps keys to raw strings, records every mutation in its
//! history and notifies subscribed listeners.

pub mod events;
pub mod key;
pub mod store;

pub use events::{EventBus, EventFilter, EventRecord, Listener, SubscriptionHandle};
pub use key::{split_key, Key, KeyValidator};
pub use store::{ConflictPolicy, IntoKey, Mapping, MergeSummary, Store};
