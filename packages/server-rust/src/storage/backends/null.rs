//! No-op [`DocumentBackend`] implementation.
//!
//! [`NullBackend`] discards all writes and returns empty results for reads.
//! It is the default backend: every document lives only in the in-memory
//! [`super::super::engine::StorageEngine`] above it, which is exactly what a
//! single-process deployment with no durability requirement wants.

use async_trait::async_trait;

use crate::storage::backend::DocumentBackend;
use crate::storage::document::Document;

/// No-op `DocumentBackend` for testing and ephemeral deployments.
///
/// All write operations succeed immediately without side effects.
/// All read operations return empty results.
pub struct NullBackend;

#[async_trait]
impl DocumentBackend for NullBackend {
    async fn add(&self, _partition: &str, _key: &str, _value: &Document) -> anyhow::Result<()> {
        Ok(())
    }

    async fn remove(&self, _partition: &str, _key: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn load(&self, _partition: &str, _key: &str) -> anyhow::Result<Option<Document>> {
        Ok(None)
    }

    async fn load_all(&self, _partition: &str) -> anyhow::Result<Vec<Document>> {
        Ok(Vec::new())
    }

    fn is_loadable(&self, _key: &str) -> bool {
        true
    }

    fn pending_operation_count(&self) -> u64 {
        0
    }

    async fn hard_flush(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn reset(&self) {}

    fn is_null(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_returns_ok() {
        let backend = NullBackend;
        let doc = Document::new("id1", "p1");
        assert!(backend.add("p1", "id1", &doc).await.is_ok());
    }

    #[tokio::test]
    async fn remove_returns_ok() {
        let backend = NullBackend;
        assert!(backend.remove("p1", "id1").await.is_ok());
    }

    #[tokio::test]
    async fn load_returns_none() {
        let backend = NullBackend;
        assert!(backend.load("p1", "id1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_all_returns_empty() {
        let backend = NullBackend;
        assert!(backend.load_all("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hard_flush_returns_ok() {
        let backend = NullBackend;
        assert!(backend.hard_flush().await.is_ok());
    }

    #[test]
    fn is_null_is_true() {
        assert!(NullBackend.is_null());
    }

    #[test]
    fn is_loadable_is_true() {
        assert!(NullBackend.is_loadable("any"));
    }

    #[test]
    fn pending_operation_count_is_zero() {
        assert_eq!(NullBackend.pending_operation_count(), 0);
    }

    #[test]
    fn reset_does_not_panic() {
        NullBackend.reset();
    }
}
