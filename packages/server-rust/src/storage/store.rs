//! The single-partition repository: point reads, page-bounded queries, and
//! the entry point into [`Transaction`](super::transaction::Transaction).
//!
//! Orchestrates the [`StorageEngine`] (in-memory) and [`DocumentBackend`]
//! (durability seam) layers, adding the partition-scoping and
//! page-of-1/page-of-2 query contracts operation handlers rely on. Named
//! `DocumentStore` rather than `RecordStore` because it has no mutation
//! observer or eviction machinery left — every document lives until deleted.
//!
//! None of the read methods below take a cancellation token: they resolve
//! against the in-memory engine synchronously, with no suspension point to
//! cancel. [`Transaction::commit`](super::transaction::Transaction::commit),
//! reached through [`create_transaction`](DocumentStore::create_transaction),
//! is where this store's actual suspension (the durable-backend write) lives.

use std::sync::Arc;

use promise_core::{Id, PartitionKey};

use crate::error::{EngineError, EngineResult};
use crate::storage::backend::DocumentBackend;
use crate::storage::document::Document;
use crate::storage::engine::{FetchResult, IterationCursor, StorageEngine};
use crate::storage::transaction::Transaction;
use promise_core::Clock;

/// Single-partition read/query API, and the factory for transactions that
/// mutate a partition.
///
/// Cheap to clone: every field is an `Arc`.
#[derive(Clone)]
pub struct DocumentStore {
    pub(crate) engine: Arc<dyn StorageEngine>,
    pub(crate) backend: Arc<dyn DocumentBackend>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore").finish_non_exhaustive()
    }
}

impl DocumentStore {
    /// Builds a store over the given engine, backend, and clock.
    #[must_use]
    pub fn new(
        engine: Arc<dyn StorageEngine>,
        backend: Arc<dyn DocumentBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine,
            backend,
            clock,
        }
    }

    /// Reads the clock this store was built with.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Point read. `pk` must be the partition `id` actually lives in.
    pub fn get(&self, id: &str, pk: &PartitionKey) -> EngineResult<Option<Document>> {
        let id = Id::parse_external(id)?;
        if !pk.matches_id(&id) {
            return Err(EngineError::InvalidState(format!(
                "partition key {:?} is not the partition derived from id {:?}",
                pk.as_str(),
                id.as_str()
            )));
        }
        Ok(self
            .engine
            .get(id.as_str())
            .filter(|doc| doc.partition == pk.as_str()))
    }

    /// Page-of-1 existence query within `pk`.
    pub fn exists(&self, pk: &PartitionKey, filter: &dyn Fn(&Document) -> bool) -> bool {
        let scoped = |doc: &Document| doc.partition == pk.as_str() && filter(doc);
        let cursor = IterationCursor::start();
        !self.engine.fetch(&scoped, None, &cursor, 1).items.is_empty()
    }

    /// Page-of-2 query within `pk`. More than one hit fails [`EngineError::MultipleMatches`].
    pub fn load(
        &self,
        pk: &PartitionKey,
        filter: &dyn Fn(&Document) -> bool,
    ) -> EngineResult<Option<Document>> {
        let scoped = |doc: &Document| doc.partition == pk.as_str() && filter(doc);
        let cursor = IterationCursor::start();
        let mut result = self.engine.fetch(&scoped, None, &cursor, 2);
        match result.items.len() {
            0 => Ok(None),
            1 => Ok(Some(result.items.swap_remove(0))),
            _ => Err(EngineError::MultipleMatches),
        }
    }

    /// Cursor-paginated iteration within `pk`, ordered by `order_key` ascending
    /// (or by id if `order_key` is `None`).
    pub fn list(
        &self,
        pk: &PartitionKey,
        filter: &dyn Fn(&Document) -> bool,
        order_key: Option<&dyn Fn(&Document) -> String>,
        cursor: &IterationCursor,
        page_size: usize,
    ) -> FetchResult<Document> {
        let scoped = |doc: &Document| doc.partition == pk.as_str() && filter(doc);
        self.engine.fetch(&scoped, order_key, cursor, page_size)
    }

    /// Cross-partition cursor-paginated scan, used by the salvager to find
    /// due promises regardless of which partition they live in.
    pub fn list_cross_partition(
        &self,
        filter: &dyn Fn(&Document) -> bool,
        order_key: Option<&dyn Fn(&Document) -> String>,
        cursor: &IterationCursor,
        page_size: usize,
    ) -> FetchResult<Document> {
        self.engine.fetch(filter, order_key, cursor, page_size)
    }

    /// Opens a transaction scoped to a single partition.
    #[must_use]
    pub fn create_transaction(&self, pk: PartitionKey) -> Transaction {
        Transaction::new(self.clone(), pk)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use promise_core::clock::ManualClock;

    use super::*;
    use crate::storage::backends::NullBackend;
    use crate::storage::engines::HashMapStorage;

    fn store() -> DocumentStore {
        DocumentStore::new(
            Arc::new(HashMapStorage::new()),
            Arc::new(NullBackend),
            Arc::new(ManualClock::new(0)),
        )
    }

    #[test]
    fn get_rejects_mismatched_partition() {
        let store = store();
        let id = "0000000000000000000abc";
        let pk = PartitionKey::for_string("xyz".to_string()).unwrap();
        assert!(store.get(id, &pk).is_err());
    }

    #[test]
    fn get_returns_none_for_missing_id() {
        let store = store();
        let pk = PartitionKey::for_string("abc".to_string()).unwrap();
        assert_eq!(store.get("0000000000000000000abc", &pk).unwrap(), None);
    }

    #[test]
    fn get_rejects_malformed_id() {
        let store = store();
        let pk = PartitionKey::for_string("abc".to_string()).unwrap();
        let err = store.get("too-short", &pk).unwrap_err();
        assert_eq!(err.kind(), "Validation");
    }

    #[test]
    fn exists_and_load_scope_to_partition() {
        let store = store();
        let doc = Document::new("id1", "p1").with_field("kind", "widget");
        store.engine.put(doc);

        let p1 = PartitionKey::for_string("p1".to_string()).unwrap();
        let p2 = PartitionKey::for_string("p2".to_string()).unwrap();
        let filter = |d: &Document| d.field_str("kind") == Some("widget");

        assert!(store.exists(&p1, &filter));
        assert!(!store.exists(&p2, &filter));
        assert_eq!(store.load(&p1, &filter).unwrap().unwrap().id, "id1");
    }

    #[test]
    fn load_fails_multiple_matches() {
        let store = store();
        store
            .engine
            .put(Document::new("id1", "p1").with_field("kind", "widget"));
        store
            .engine
            .put(Document::new("id2", "p1").with_field("kind", "widget"));

        let p1 = PartitionKey::for_string("p1".to_string()).unwrap();
        let filter = |d: &Document| d.field_str("kind") == Some("widget");
        let err = store.load(&p1, &filter).unwrap_err();
        assert_eq!(err.kind(), "MultipleMatches");
    }

    #[test]
    fn list_cross_partition_ignores_partition_scope() {
        let store = store();
        store.engine.put(Document::new("id1", "p1"));
        store.engine.put(Document::new("id2", "p2"));

        let cursor = IterationCursor::start();
        let result = store.list_cross_partition(&|_| true, None, &cursor, 10);
        assert_eq!(result.items.len(), 2);
    }
}
