//! Low-level storage engine trait and cursor-based iteration types.
//!
//! [`StorageEngine`] is the innermost storage layer: an in-memory keyed store
//! of [`Document`]s with a predicate- and order-aware scan. Everything above
//! it ([`super::store::DocumentStore`]) adds etag assignment, transactions,
//! and partition semantics; this layer only knows about documents and keys.

use super::document::Document;

/// Opaque cursor for resumable iteration over storage entries.
///
/// Implementations encode their internal position in the `state` field.
/// Consumers should treat `state` as opaque and only check `finished`.
#[derive(Debug, Clone)]
pub struct IterationCursor {
    /// Opaque state for the storage implementation to resume iteration.
    pub state: Vec<u8>,
    /// Whether iteration has completed (no more entries).
    pub finished: bool,
}

impl IterationCursor {
    /// Creates a cursor positioned at the beginning of the storage.
    #[must_use]
    pub fn start() -> Self {
        Self {
            state: Vec::new(),
            finished: false,
        }
    }
}

impl Default for IterationCursor {
    fn default() -> Self {
        Self::start()
    }
}

/// Result of a cursor-based fetch operation.
///
/// Contains the fetched items and an updated cursor for the next call.
#[derive(Debug)]
pub struct FetchResult<T> {
    /// The fetched items.
    pub items: Vec<T>,
    /// Updated cursor for the next fetch call.
    pub next_cursor: IterationCursor,
}

/// Low-level typed key-value storage with cursor-based iteration.
///
/// Implementations are in-memory. All operations are synchronous.
/// Wrapped in `Arc<dyn StorageEngine>` for sharing across async boundaries.
pub trait StorageEngine: Send + Sync + 'static {
    /// Insert or replace a document by id. Returns the previous document if any.
    fn put(&self, doc: Document) -> Option<Document>;

    /// Retrieve a document by id, or `None` if not present.
    fn get(&self, id: &str) -> Option<Document>;

    /// Remove a document by id, returning the removed document.
    fn remove(&self, id: &str) -> Option<Document>;

    /// Check if an id exists without returning the document.
    fn contains_key(&self, id: &str) -> bool;

    /// Return the number of entries.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries. Takes `&self` for `Arc<dyn StorageEngine>` compatibility.
    fn clear(&self);

    /// Return a point-in-time snapshot of all entries.
    ///
    /// The snapshot is mutation-tolerant: concurrent modifications do not fail,
    /// but (per spec §4.1) this means pagination over a mutating dataset is
    /// consistent-prefix, not snapshot-isolated.
    fn snapshot_iter(&self) -> Vec<Document>;

    /// Scan for documents matching `filter`, optionally ordered by `order_key`
    /// (ascending, lexicographic on the returned string), paginated through
    /// `cursor` in pages of at least `size`.
    fn fetch(
        &self,
        filter: &dyn Fn(&Document) -> bool,
        order_key: Option<&dyn Fn(&Document) -> String>,
        cursor: &IterationCursor,
        size: usize,
    ) -> FetchResult<Document>;
}
