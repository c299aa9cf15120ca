//! Change subscriptions.
//!
//! Listeners register with a filter and are called synchronously after each
//! store mutation that matches. A listener returning `Err` or panicking is
//! logged and skipped; the mutation and the remaining listeners proceed.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;
use tracing::warn;

use crate::namespace::key::Key;
use crate::snapshot::history::{HistoryOp, Source};

/// A single change delivered to listeners. Not retained after dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub key: Key,
    pub operation: HistoryOp,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
    pub source: Source,
}

/// Which changes a listener receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    AllChanges,
    Scope(String),
    Key(Key),
}

impl EventFilter {
    pub fn matches(&self, key: &Key) -> bool {
        match self {
            EventFilter::AllChanges => true,
            EventFilter::Scope(scope) => key.scope() == scope,
            EventFilter::Key(k) => k == key,
        }
    }
}

/// Opaque handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

pub type Listener = Box<dyn FnMut(&EventRecord) -> Result<(), String>>;

struct Subscription {
    handle: SubscriptionHandle,
    filter: EventFilter,
    listener: Listener,
}

/// Registry of listeners owned by one store.
#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_handle: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, filter: EventFilter, listener: F) -> SubscriptionHandle
    where
        F: FnMut(&EventRecord) -> Result<(), String> + 'static,
    {
        let handle = SubscriptionHandle(self.next_handle);
        self.next_handle += 1;
        self.subscriptions.push(Subscription {
            handle,
            filter,
            listener: Box::new(listener),
        });
        handle
    }

    /// Remove a subscription. Returns false if the handle was unknown.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.handle != handle);
        self.subscriptions.len() != before
    }

    /// Deliver `event` to every matching listener, in subscription order.
    ///
    /// Returns how many listeners completed successfully.
    pub fn dispatch(&mut self, event: &EventRecord) -> usize {
        let mut delivered = 0;
        for sub in self.subscriptions.iter_mut() {
            if !sub.filter.matches(&event.key) {
                continue;
            }
            let listener = &mut sub.listener;
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(message)) => {
                    warn!(handle = sub.handle.0, key = %event.key, %message, "listener failed");
                }
                Err(_) => {
                    warn!(handle = sub.handle.0, key = %event.key, "listener panicked");
                }
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.len())
            .field("next_handle", &self.next_handle)
            .finish()
    }
}
