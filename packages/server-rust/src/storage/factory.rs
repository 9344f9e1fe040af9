//! Builds a fully-wired [`DocumentStore`] from a chosen [`DocumentBackend`].
//!
//! The dependency-injection point: a process picks a backend (defaulting to
//! [`NullBackend`] when no durable persistence is configured) and gets back
//! a store with a fresh [`HashMapStorage`] engine in front of it.

use std::sync::Arc;

use promise_core::Clock;

use crate::storage::backend::DocumentBackend;
use crate::storage::backends::NullBackend;
use crate::storage::engines::HashMapStorage;
use crate::storage::store::DocumentStore;

/// Creates [`DocumentStore`] instances sharing a common backend and clock.
pub struct DocumentStoreFactory {
    backend: Arc<dyn DocumentBackend>,
    clock: Arc<dyn Clock>,
}

impl DocumentStoreFactory {
    /// Creates a factory backed by `backend`, using `clock` as the ambient
    /// time source for commit timestamps.
    #[must_use]
    pub fn new(backend: Arc<dyn DocumentBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Creates a factory with no durable persistence configured.
    #[must_use]
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(NullBackend), clock)
    }

    /// Builds a [`DocumentStore`] with a fresh in-memory engine.
    #[must_use]
    pub fn create(&self) -> DocumentStore {
        DocumentStore::new(
            Arc::new(HashMapStorage::new()),
            Arc::clone(&self.backend),
            Arc::clone(&self.clock),
        )
    }
}
