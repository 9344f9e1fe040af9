//! 22-character base62 time-ordered identifiers with an embedded partition
//! suffix.
//!
//! An [`Id`] is always exactly 22 ASCII alphanumeric characters. Its last 3
//! characters are its partition (see [`crate::partition_key`]). Generation is
//! pluggable via an ambient [`IdScope`] stack, the way the teacher's
//! `hlc::ClockSource` is swapped out in tests — except here the swap is
//! scoped rather than global, so nested scopes restore the enclosing
//! generator on drop.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;
use crate::partition_key::PartitionKey;

const LEN: usize = 22;
const PARTITION_LEN: usize = 3;
const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// A 22-character base62 identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(String);

impl Id {
    /// Generates a fresh ID using the innermost ambient generator (or the
    /// default time-ordered generator if no scope is active).
    #[must_use]
    pub fn generate() -> Self {
        with_ambient_generator(|g| g.next())
    }

    /// Generates a fresh ID and overwrites its trailing 3 characters with
    /// `pk`, so the result's partition is exactly `pk`.
    ///
    /// The remaining 19 characters still come from the ambient generator, so
    /// the result stays unique with overwhelming probability even though the
    /// partition is fixed.
    #[must_use]
    pub fn generate_in_partition(pk: &PartitionKey) -> Self {
        let mut id = Self::generate().0.into_bytes();
        let suffix = pk.as_str().as_bytes();
        debug_assert_eq!(suffix.len(), PARTITION_LEN, "partition key must be 3 bytes to embed in an id");
        id[LEN - PARTITION_LEN..].copy_from_slice(suffix);
        Self(String::from_utf8(id).expect("ascii-only buffer"))
    }

    /// Borrows the 22-character string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing 3 characters, i.e. this id's partition.
    #[must_use]
    pub fn partition_suffix(&self) -> &str {
        &self.0[LEN - PARTITION_LEN..]
    }

    /// True if `s` is 22 ASCII-alphanumeric characters.
    #[must_use]
    pub fn is_well_formed(s: &str) -> bool {
        s.chars().count() == LEN && s.chars().all(|c| c.is_ascii_alphanumeric())
    }

    /// Validates a caller-supplied id at a storage boundary, e.g. a request
    /// path segment or a repository lookup key.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ExternalIdValueEmpty`] for an empty string,
    /// [`ValidationError::ExternalIdValueTooLong`] for a string of any other
    /// length than [`LEN`](Self), or [`ValidationError::ExternalIdValueInvalid`]
    /// for a 22-character string with a non-alphanumeric character.
    pub fn parse_external(value: &str) -> Result<Self, ValidationError> {
        if value.is_empty() {
            return Err(ValidationError::ExternalIdValueEmpty);
        }
        let len = value.chars().count();
        if len != LEN {
            return Err(ValidationError::ExternalIdValueTooLong {
                value: value.to_string(),
                len,
                expected: LEN,
            });
        }
        if !Self::is_well_formed(value) {
            return Err(ValidationError::ExternalIdValueInvalid {
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if !Self::is_well_formed(&s) {
            return Err(D::Error::custom(format!(
                "'{s}' is not a 22-character base62 identifier"
            )));
        }
        Ok(Self(s))
    }
}

/// Produces the next [`Id`] in some scheme (time-ordered, incremental, ...).
pub trait IdGenerator: Send + Sync {
    /// Produces the next id. Implementations need not honor any partition;
    /// [`Id::generate_in_partition`] overwrites the suffix afterward.
    fn next(&self) -> Id;
}

/// Default generator: a v7-UUID-style 48-bit millisecond timestamp in the
/// high bits, 80 random bits in the low bits, the whole 128-bit value
/// base62-encoded into 22 characters.
#[derive(Debug, Default)]
pub struct DefaultIdGenerator;

impl IdGenerator for DefaultIdGenerator {
    fn next(&self) -> Id {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock is before Unix epoch")
            .as_millis() as u128;
        let millis = millis & ((1u128 << 48) - 1);
        let random_tail: u128 = rand::rng().random::<u128>() & ((1u128 << 80) - 1);
        let value = (millis << 80) | random_tail;
        Id(encode_base62(value))
    }
}

/// Strictly incremental generator for deterministic tests: each call returns
/// a base62 encoding of a monotonically increasing counter, so generation
/// order is exactly call order.
#[derive(Debug)]
pub struct IncrementalIdGenerator {
    counter: AtomicU64,
}

impl IncrementalIdGenerator {
    /// Creates a generator whose first call returns the encoding of `start`.
    #[must_use]
    pub fn starting_at(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
        }
    }
}

impl Default for IncrementalIdGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdGenerator for IncrementalIdGenerator {
    fn next(&self) -> Id {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Id(encode_base62(u128::from(n)))
    }
}

fn encode_base62(value: u128) -> String {
    let mut buf = [0u8; LEN];
    let mut v = value;
    for slot in buf.iter_mut().rev() {
        *slot = ALPHABET[(v % 62) as usize];
        v /= 62;
    }
    String::from_utf8(buf.to_vec()).expect("alphabet is ascii")
}

thread_local! {
    static GENERATOR_STACK: RefCell<Vec<Arc<dyn IdGenerator>>> = const { RefCell::new(Vec::new()) };
}

fn with_ambient_generator<R>(f: impl FnOnce(&dyn IdGenerator) -> R) -> R {
    GENERATOR_STACK.with(|stack| {
        let stack = stack.borrow();
        match stack.last() {
            Some(g) => f(g.as_ref()),
            None => f(&DefaultIdGenerator),
        }
    })
}

/// An ambient generator scope: while alive, [`Id::generate`] consults
/// this generator. Scopes nest in stack order — dropping an inner scope
/// restores the next-outer one.
pub struct IdScope {
    _private: (),
}

impl IdScope {
    /// Pushes `generator` onto the ambient stack for the current thread and
    /// returns a guard that pops it back off on drop.
    #[must_use]
    pub fn push(generator: Arc<dyn IdGenerator>) -> Self {
        GENERATOR_STACK.with(|stack| stack.borrow_mut().push(generator));
        Self { _private: () }
    }
}

impl Drop for IdScope {
    fn drop(&mut self) {
        GENERATOR_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_well_formed() {
        let id = Id::generate();
        assert!(Id::is_well_formed(id.as_str()));
    }

    #[test]
    fn partition_scoped_generation_embeds_suffix() {
        let pk = PartitionKey::for_string("abc".to_string()).unwrap();
        let id = Id::generate_in_partition(&pk);
        assert_eq!(id.partition_suffix(), "abc");
        assert!(Id::is_well_formed(id.as_str()));
        assert_ne!(id.as_str(), pk.as_str());
    }

    #[test]
    fn incremental_scope_is_strictly_increasing_and_nests() {
        let outer = Arc::new(IncrementalIdGenerator::starting_at(1));
        let _outer_scope = IdScope::push(outer);
        let a = Id::generate();
        {
            let inner = Arc::new(IncrementalIdGenerator::starting_at(1000));
            let _inner_scope = IdScope::push(inner);
            let b = Id::generate();
            assert!(b.as_str() > a.as_str());
        }
        // inner scope dropped: outer generator resumes from where it left off.
        let c = Id::generate();
        assert_ne!(a, c);
    }

    #[test]
    fn encode_base62_is_fixed_width() {
        assert_eq!(encode_base62(0).len(), LEN);
        assert_eq!(encode_base62(u128::MAX >> 1).len(), LEN);
    }

    #[test]
    fn serde_round_trips_through_json_string() {
        let id = Id::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_str()));
        let back: Id = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn serde_rejects_malformed_string() {
        let result: Result<Id, _> = serde_json::from_str("\"too-short\"");
        assert!(result.is_err());
    }

    #[test]
    fn parse_external_accepts_well_formed_id() {
        let id = Id::generate();
        let parsed = Id::parse_external(id.as_str()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_external_rejects_empty_string() {
        let err = Id::parse_external("").unwrap_err();
        assert_eq!(err, ValidationError::ExternalIdValueEmpty);
    }

    #[test]
    fn parse_external_rejects_wrong_length() {
        let err = Id::parse_external("too-short").unwrap_err();
        match err {
            ValidationError::ExternalIdValueTooLong { len, expected, .. } => {
                assert_eq!(len, 9);
                assert_eq!(expected, LEN);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_external_rejects_non_alphanumeric_characters() {
        let bad = format!("{}-", &"0".repeat(LEN - 1));
        let err = Id::parse_external(&bad).unwrap_err();
        assert!(matches!(err, ValidationError::ExternalIdValueInvalid { .. }));
    }
}
