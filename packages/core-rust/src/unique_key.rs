//! Unique-key values: path-qualified claim tokens used by the momentary-lock
//! factory to turn "this value must be unique" into "insert this item and
//! see if it conflicts".
//!
//! The encoding is the entire contract: two callers racing to claim the same
//! `(path, value)` pair must produce byte-identical ids so the document
//! store's etag-conditional insert is the arbiter, not application logic.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::partition_key::MAX_BYTES as MAX_PARTITION_KEY_BYTES;

/// Value bytes are truncated to this many bytes before encoding, per the
/// data model's `2 * MaxPartitionKeyBytes` rule.
pub const MAX_VALUE_BYTES: usize = 2 * MAX_PARTITION_KEY_BYTES;

/// TTL, in seconds, of a unique-key item in the document store.
pub const TTL_SECONDS: u32 = 20;

/// A path-qualified claim token: `Path` identifies the owning JSON property,
/// `Value` is the base64url-encoded candidate value, and `id` is the pair's
/// canonical claim key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKeyValue {
    path: String,
    value: String,
    id: String,
}

impl UniqueKeyValue {
    /// Builds a claim token for `candidate` at the JSON path formed by
    /// joining `path_segments` with `|`, each prefixed by a leading `|`.
    ///
    /// `candidate`'s UTF-8 bytes are truncated to [`MAX_VALUE_BYTES`] before
    /// being base64url-encoded (no padding, `+` to `-`, `/` to `_`).
    #[must_use]
    pub fn create(path_segments: &[&str], candidate: &str) -> Self {
        let mut path = String::new();
        for segment in path_segments {
            path.push('|');
            path.push_str(segment);
        }

        let mut bytes = candidate.as_bytes();
        if bytes.len() > MAX_VALUE_BYTES {
            bytes = &bytes[..MAX_VALUE_BYTES];
        }
        let value = URL_SAFE_NO_PAD.encode(bytes);

        let id = format!("Uniq{path}|{value}");

        Self { path, value, id }
    }

    /// The `|`-joined JSON path, e.g. `|Ord_Data|Itm`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The base64url-encoded candidate value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The canonical claim key: `"Uniq" + path + "|" + value`.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The document-store partition for this item: its own encoded value.
    #[must_use]
    pub fn partition(&self) -> &str {
        &self.value
    }

    /// TTL, in seconds, this item should be inserted with.
    #[must_use]
    pub fn ttl_seconds(&self) -> u32 {
        TTL_SECONDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_literal_scenario() {
        let key = UniqueKeyValue::create(&["SeriTest_StringJsonProp"], "/\\#?\"");
        assert_eq!(key.path(), "|SeriTest_StringJsonProp");
        assert_eq!(key.value(), "L1wjPyI");
        assert_eq!(key.id(), "Uniq|SeriTest_StringJsonProp|L1wjPyI");
        assert_eq!(key.ttl_seconds(), 20);
    }

    #[test]
    fn multi_segment_path_joins_each_with_leading_pipe() {
        let key = UniqueKeyValue::create(&["Ord_Data", "Itm"], "x");
        assert_eq!(key.path(), "|Ord_Data|Itm");
    }

    #[test]
    fn value_is_url_safe_and_unpadded() {
        // chosen so the standard (non-URL) base64 alphabet would emit '+' and '/'
        let candidate = "\u{03FB}\u{03FF}\u{00BE}";
        let key = UniqueKeyValue::create(&["p"], candidate);
        assert!(!key.value().contains('+'));
        assert!(!key.value().contains('/'));
        assert!(!key.value().contains('='));
    }

    #[test]
    fn candidate_longer_than_limit_is_truncated_before_encoding() {
        let long = "x".repeat(MAX_VALUE_BYTES + 50);
        let key = UniqueKeyValue::create(&["p"], &long);
        let expected = URL_SAFE_NO_PAD.encode(&long.as_bytes()[..MAX_VALUE_BYTES]);
        assert_eq!(key.value(), expected);
    }

    #[test]
    fn partition_is_the_encoded_value() {
        let key = UniqueKeyValue::create(&["p"], "v");
        assert_eq!(key.partition(), key.value());
    }
}
