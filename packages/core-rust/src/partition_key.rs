//! Partition keys: the validated label a document-store partition is keyed
//! by, either derived from an [`Id`]'s trailing 3 characters or validated
//! from an arbitrary string.
//!
//! Kept as two constructors rather than a single fallible `From<&str>` or a
//! lossy cast: an id-derived key and an arbitrary-string key answer
//! "does this equal that id's partition" differently (an arbitrary key only
//! equals an id when the *whole* id matches, not just its suffix), and
//! collapsing the two behind one coercion silently picks a truncation
//! semantics nothing in this domain asked for.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;
use crate::id::Id;

/// Maximum UTF-8 byte length of an arbitrary-string partition key.
pub const MAX_BYTES: usize = 100;

const FORBIDDEN_CHARS: &[char] = &['/', '\\', '#', '?', '"'];

/// A validated partition label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Derives the partition key from an id's trailing 3 characters. Always
    /// succeeds: an [`Id`] is constructed from an alphanumeric alphabet that
    /// already satisfies every partition-key validation rule.
    #[must_use]
    pub fn of_id(id: &Id) -> Self {
        Self(id.partition_suffix().to_string())
    }

    /// Validates and wraps an arbitrary string as a partition key.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::PartitionKeyValueTooLong`] if `value`
    /// exceeds [`MAX_BYTES`] UTF-8 bytes, or
    /// [`ValidationError::PartitionKeyValueInvalid`] if it contains a
    /// forbidden character, a control character, a line/paragraph
    /// separator, or a private-use code point.
    pub fn for_string(value: String) -> Result<Self, ValidationError> {
        let len = value.len();
        if len > MAX_BYTES {
            return Err(ValidationError::PartitionKeyValueTooLong {
                value,
                len,
                max: MAX_BYTES,
            });
        }
        if value.chars().any(is_forbidden) {
            return Err(ValidationError::PartitionKeyValueInvalid { value });
        }
        Ok(Self(value))
    }

    /// Borrows the key's string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `id`'s own partition is this key, i.e. `id`'s trailing 3
    /// characters equal this key's full value.
    #[must_use]
    pub fn matches_id(&self, id: &Id) -> bool {
        id.partition_suffix() == self.0
    }

    /// True if this key, compared as a whole string, equals `id`'s full
    /// identifier string (not just its partition suffix) — the only sense in
    /// which an arbitrary-string key can equal an id, per the split-API
    /// design (see module docs).
    #[must_use]
    pub fn equals_id_value(&self, id: &Id) -> bool {
        self.0 == id.as_str()
    }
}

impl Serialize for PartitionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PartitionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::for_string(s).map_err(D::Error::custom)
    }
}

fn is_forbidden(c: char) -> bool {
    FORBIDDEN_CHARS.contains(&c)
        || c.is_control()
        || c == '\u{2028}' // line separator
        || c == '\u{2029}' // paragraph separator
        || is_private_use(c)
}

fn is_private_use(c: char) -> bool {
    let cp = c as u32;
    (0xE000..=0xF8FF).contains(&cp)
        || (0xF0000..=0xFFFFD).contains(&cp)
        || (0x100000..=0x10FFFD).contains(&cp)
}
