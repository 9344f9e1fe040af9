//! The document shape persisted by [`super::store::DocumentStore`].
//!
//! A document is a flat JSON object plus the three fields the document store
//! itself owns: `id`, `part` (the partition), and the optimistic-concurrency
//! pair `_etag`/`_ts`. Everything else — `Promise_Due`, `Uniq_Path`, whatever
//! a caller's entity needs — lives in `fields`, serialized inline via
//! `#[serde(flatten)]` so the wire shape matches a plain JSON document rather
//! than a nested envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single stored item: the id/partition/etag/timestamp envelope plus an
/// arbitrary flat field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The document's id.
    pub id: String,
    /// The partition this document lives in.
    #[serde(rename = "part")]
    pub partition: String,
    /// Storage-assigned version token. `None` for an instance that has never
    /// been committed.
    #[serde(rename = "_etag", skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Storage-assigned creation/modification instant, in seconds since the
    /// Unix epoch. Zero means never stored.
    #[serde(rename = "_ts")]
    pub ts_seconds: i64,
    /// Time-to-live in seconds from `ts_seconds`, if this document expires.
    #[serde(rename = "ttl", skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u32>,
    /// Every other field, flattened into the same JSON object.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Builds a new, never-stored document.
    #[must_use]
    pub fn new(id: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            partition: partition.into(),
            etag: None,
            ts_seconds: 0,
            ttl_seconds: None,
            fields: Map::new(),
        }
    }

    /// Sets a field, returning `self` for chaining during construction.
    #[must_use]
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Sets the document's TTL, returning `self` for chaining.
    #[must_use]
    pub fn with_ttl(mut self, ttl_seconds: u32) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }

    /// Reads a string field.
    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Reads an unsigned integer field.
    #[must_use]
    pub fn field_u64(&self, name: &str) -> Option<u64> {
        self.fields.get(name).and_then(Value::as_u64)
    }

    /// Reads a signed integer field.
    #[must_use]
    pub fn field_i64(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(Value::as_i64)
    }

    /// Whether this document is authoritative — has an etag, i.e. exists in
    /// storage from this process's point of view.
    #[must_use]
    pub fn is_stored(&self) -> bool {
        self.etag.is_some()
    }

    /// Whether, as of `now_seconds`, this document's TTL has elapsed.
    #[must_use]
    pub fn is_expired(&self, now_seconds: i64) -> bool {
        match self.ttl_seconds {
            Some(ttl) if self.ts_seconds > 0 => now_seconds >= self.ts_seconds + i64::from(ttl),
            _ => false,
        }
    }
}
