//! In-memory [`StorageEngine`] implementation backed by [`DashMap`].
//!
//! The sole concrete [`StorageEngine`] in this repo: it holds every
//! document, across every partition, in one map. Per-partition and
//! cross-partition scans are both just filtered views over it, since a
//! single-node process has no reason to shard keyspace the way a cluster
//! node would.

use dashmap::DashMap;

use crate::storage::document::Document;
use crate::storage::engine::{FetchResult, IterationCursor, StorageEngine};

/// In-memory storage backed by [`DashMap`] for concurrent read access.
pub struct HashMapStorage {
    entries: DashMap<String, Document>,
}

impl HashMapStorage {
    /// Creates a new, empty `HashMapStorage`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for HashMapStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes a cursor's opaque state into a `u64` offset.
///
/// Empty state (from `IterationCursor::start()`) is treated as offset 0.
fn decode_cursor_offset(cursor: &IterationCursor) -> u64 {
    if cursor.state.is_empty() {
        0
    } else {
        let mut buf = [0u8; 8];
        let len = cursor.state.len().min(8);
        buf[..len].copy_from_slice(&cursor.state[..len]);
        u64::from_le_bytes(buf)
    }
}

/// Encodes an offset into cursor state bytes (little-endian `u64`).
fn encode_cursor_offset(offset: u64) -> Vec<u8> {
    offset.to_le_bytes().to_vec()
}

impl StorageEngine for HashMapStorage {
    fn put(&self, doc: Document) -> Option<Document> {
        self.entries.insert(doc.id.clone(), doc)
    }

    fn get(&self, id: &str) -> Option<Document> {
        self.entries.get(id).map(|r| r.clone())
    }

    fn remove(&self, id: &str) -> Option<Document> {
        self.entries.remove(id).map(|(_, r)| r)
    }

    fn contains_key(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn snapshot_iter(&self) -> Vec<Document> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }

    fn fetch(
        &self,
        filter: &dyn Fn(&Document) -> bool,
        order_key: Option<&dyn Fn(&Document) -> String>,
        cursor: &IterationCursor,
        size: usize,
    ) -> FetchResult<Document> {
        let mut matching: Vec<Document> = self.snapshot_iter().into_iter().filter(filter).collect();
        if let Some(key_fn) = order_key {
            matching.sort_by_key(key_fn);
        } else {
            matching.sort_by(|a, b| a.id.cmp(&b.id));
        }

        let total = matching.len();
        // Cursor offsets are always small (bounded by storage size), so truncation is safe.
        #[allow(clippy::cast_possible_truncation)]
        let offset = decode_cursor_offset(cursor) as usize;

        let items: Vec<Document> = matching.into_iter().skip(offset).take(size).collect();
        let new_offset = offset + items.len();
        let finished = new_offset >= total;

        FetchResult {
            items,
            next_cursor: IterationCursor {
                state: encode_cursor_offset(new_offset as u64),
                finished,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, partition: &str, order: i64) -> Document {
        Document::new(id, partition).with_field("order", order)
    }

    #[test]
    fn put_get_remove_round_trip() {
        let storage = HashMapStorage::new();
        assert!(storage.put(doc("a", "p1", 0)).is_none());

        let fetched = storage.get("a");
        assert!(fetched.is_some());

        let removed = storage.remove("a");
        assert!(removed.is_some());
        assert!(storage.get("a").is_none());
    }

    #[test]
    fn contains_key_reflects_state() {
        let storage = HashMapStorage::new();
        assert!(!storage.contains_key("a"));
        storage.put(doc("a", "p1", 0));
        assert!(storage.contains_key("a"));
        storage.remove("a");
        assert!(!storage.contains_key("a"));
    }

    #[test]
    fn len_and_is_empty() {
        let storage = HashMapStorage::new();
        assert!(storage.is_empty());
        storage.put(doc("a", "p1", 0));
        storage.put(doc("b", "p2", 0));
        assert_eq!(storage.len(), 2);
        storage.remove("a");
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn clear_empties_storage() {
        let storage = HashMapStorage::new();
        storage.put(doc("a", "p1", 0));
        storage.put(doc("b", "p2", 0));
        storage.clear();
        assert!(storage.is_empty());
    }

    #[test]
    fn fetch_paginates_and_filters_by_partition() {
        let storage = HashMapStorage::new();
        for i in 0..5 {
            storage.put(doc(&format!("key{i}"), "p1", i));
        }
        storage.put(doc("other", "p2", 0));

        let filter = |d: &Document| d.partition == "p1";
        let cursor = IterationCursor::start();
        let page1 = storage.fetch(&filter, None, &cursor, 3);
        assert_eq!(page1.items.len(), 3);
        assert!(!page1.next_cursor.finished);

        let page2 = storage.fetch(&filter, None, &page1.next_cursor, 3);
        assert_eq!(page2.items.len(), 2);
        assert!(page2.next_cursor.finished);
    }

    #[test]
    fn fetch_orders_by_key() {
        let storage = HashMapStorage::new();
        storage.put(doc("c", "p1", 3));
        storage.put(doc("a", "p1", 1));
        storage.put(doc("b", "p1", 2));

        let filter = |_: &Document| true;
        let order = |d: &Document| format!("{:020}", d.field_i64("order").unwrap());
        let cursor = IterationCursor::start();
        let result = storage.fetch(&filter, Some(&order), &cursor, 10);
        let ids: Vec<&str> = result.items.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn snapshot_iter_returns_all_entries() {
        let storage = HashMapStorage::new();
        storage.put(doc("a", "p1", 0));
        storage.put(doc("b", "p1", 0));
        assert_eq!(storage.snapshot_iter().len(), 2);
    }
}
