//! External persistence backend trait for the storage layer.
//!
//! Defines [`DocumentBackend`], the seam between [`super::store::DocumentStore`]
//! and whatever durable storage backs it. The store calls `add()` / `remove()`
//! on every mutation; the implementation decides when and how the data
//! actually lands on disk (or wherever). This crate ships only
//! [`super::backends::NullBackend`]: a process that needs real durability
//! plugs in its own implementation without touching the store above it.

use async_trait::async_trait;

use super::document::Document;

/// External persistence backend for a [`super::store::DocumentStore`].
///
/// Used as `Arc<dyn DocumentBackend>`.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Persist a document (or queue it for async persistence).
    async fn add(&self, partition: &str, key: &str, value: &Document) -> anyhow::Result<()>;

    /// Remove a document from the backing store (or queue the removal).
    async fn remove(&self, partition: &str, key: &str) -> anyhow::Result<()>;

    /// Load a single document from the backing store.
    ///
    /// Returns `None` if the key does not exist.
    async fn load(&self, partition: &str, key: &str) -> anyhow::Result<Option<Document>>;

    /// Load every document in a partition from the backing store.
    async fn load_all(&self, partition: &str) -> anyhow::Result<Vec<Document>>;

    /// Check if a key is safe to load (not queued for write-behind).
    ///
    /// For write-through implementations, always returns `true`.
    fn is_loadable(&self, key: &str) -> bool;

    /// Number of pending (not yet flushed) operations.
    ///
    /// For write-through, always returns 0.
    fn pending_operation_count(&self) -> u64;

    /// Flush all pending writes immediately in the calling task.
    ///
    /// Called during process shutdown for data safety.
    async fn hard_flush(&self) -> anyhow::Result<()>;

    /// Reset the backend to its initial state (clear queues, etc.).
    fn reset(&self);

    /// Whether this is a null (no-op) implementation.
    ///
    /// Returns `false` by default. Null implementations override to return `true`.
    fn is_null(&self) -> bool {
        false
    }
}
