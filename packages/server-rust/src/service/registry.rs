//! The action registry (populated once at process start, immutable
//! thereafter): maps a promise's stable `ActionName` to the handler invoked
//! when it fulfills.
//!
//! Narrower than a lifecycle-managed service registry that resolves by both
//! name and type — a fulfillment handler has no init/shutdown lifecycle of
//! its own, so this keeps only the by-name `DashMap` lookup.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::service::promise::Promise;

/// A registered fulfillment handler. Must be idempotent: the subsystem
/// guarantees at-least-once invocation of a promise's action, never
/// exactly-once.
#[async_trait]
pub trait Action: Send + Sync {
    /// Runs the action for `promise`. Any error is treated as a fulfillment
    /// failure and leaves the promise in place for the next claim.
    async fn invoke(&self, promise: &Promise) -> anyhow::Result<()>;
}

/// Name-keyed lookup of registered actions.
///
/// Action names are stable identifiers persisted inside promises and must
/// never be renamed or reused for a different handler once a promise
/// referencing them may exist.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: Arc<DashMap<String, Arc<dyn Action>>>,
}

impl ActionRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            actions: Arc::new(DashMap::new()),
        }
    }

    /// Registers `action` under `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered — a startup-time wiring
    /// mistake, not a condition any caller should recover from at runtime.
    pub fn register(&self, name: impl Into<String>, action: Arc<dyn Action>) {
        let name = name.into();
        if self.actions.insert(name.clone(), action).is_some() {
            panic!("action \"{name}\" registered more than once");
        }
    }

    /// Whether `name` has a registered handler.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Looks up the handler registered for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).map(|entry| entry.value().clone())
    }
}
