//! Stable, user-facing validation errors.
//!
//! Each variant carries the stable error code a caller can match on (the
//! same code surfaces in the HTTP 400 body at the request boundary). Mirrors
//! the teacher's `thiserror`-enum-per-concern style (see
//! `service::operation::OperationError`), but scoped to argument-shape
//! validation rather than operation dispatch.

use thiserror::Error;

/// Argument-shape and character-set violations.
///
/// Maps 1:1 onto spec.md §7's `Validation` error kind. Every variant is
/// user-facing: its `Display` message is suitable as an HTTP 400 plain-text
/// body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Partition key exceeds the 100-byte UTF-8 length limit.
    #[error("partition key '{value}' is {len} bytes, exceeding the {max}-byte limit")]
    PartitionKeyValueTooLong {
        /// The offending value (truncated for display if very large).
        value: String,
        /// Its UTF-8 byte length.
        len: usize,
        /// The maximum allowed length.
        max: usize,
    },

    /// Partition key contains a forbidden character or code point.
    #[error("partition key '{value}' contains a forbidden character")]
    PartitionKeyValueInvalid {
        /// The offending value.
        value: String,
    },

    /// External ID argument was the empty string.
    #[error("external id must not be empty")]
    ExternalIdValueEmpty,

    /// External ID exceeds the identifier's fixed length.
    #[error("external id '{value}' is {len} characters, expected exactly {expected}")]
    ExternalIdValueTooLong {
        /// The offending value.
        value: String,
        /// Its character length.
        len: usize,
        /// The expected length.
        expected: usize,
    },

    /// External ID is not 22 ASCII-alphanumeric characters.
    #[error("external id '{value}' is not a valid 22-character base62 identifier")]
    ExternalIdValueInvalid {
        /// The offending value.
        value: String,
    },
}

impl ValidationError {
    /// The stable error code, e.g. for client-side matching or metrics labels.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PartitionKeyValueTooLong { .. } => "PartitionKey_ValueTooLong",
            Self::PartitionKeyValueInvalid { .. } => "PartitionKey_ValueInvalid",
            Self::ExternalIdValueEmpty => "ExternalId_ValueEmpty",
            Self::ExternalIdValueTooLong { .. } => "ExternalId_ValueTooLong",
            Self::ExternalIdValueInvalid { .. } => "ExternalId_ValueInvalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            ValidationError::PartitionKeyValueTooLong {
                value: "x".into(),
                len: 200,
                max: 100
            }
            .code(),
            "PartitionKey_ValueTooLong"
        );
        assert_eq!(ValidationError::ExternalIdValueEmpty.code(), "ExternalId_ValueEmpty");
    }

    #[test]
    fn display_is_user_facing() {
        let err = ValidationError::ExternalIdValueInvalid {
            value: "bad".to_string(),
        };
        assert!(err.to_string().contains("bad"));
    }
}
