//! The abstract error taxonomy shared by the repository, lock factory,
//! promise lifecycle, fulfiller, salvager, and migration coordinator.
//!
//! Every fallible operation in this crate returns [`EngineError`] (or wraps
//! one in [`promise_core::ValidationError`] at the edge). Keeping a single
//! enum, rather than one per module, matches how the propagation policy
//! actually branches: `Validation`/`InvalidState` reach the HTTP boundary as
//! a 400, `ConcurrencyConflict` is swallowed by the resilience pipeline,
//! `StorageError` is logged and deferred, `Canceled` is usually silent.

use thiserror::Error;

use promise_core::ValidationError;

/// The result type used throughout `promise-server`.
pub type EngineResult<T> = Result<T, EngineError>;

/// The abstract error kinds from the error-handling design.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Argument shape/length/character violation. User-facing.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// API misuse: unclaimed fulfill, forgotten promise at transaction
    /// dispose, suppress-after-load, claim-before-due, unknown action name.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Etag mismatch on a conditional write.
    #[error("concurrency conflict")]
    ConcurrencyConflict,

    /// Max lock-acquisition retries exhausted.
    #[error("lock unavailable")]
    LockUnavailable,

    /// A `Load` query matched more than one entity.
    #[error("multiple matches")]
    MultipleMatches,

    /// Any other store failure.
    #[error("storage error: {0}")]
    StorageError(#[from] anyhow::Error),

    /// The operation was canceled by its cancellation token.
    #[error("canceled")]
    Canceled,

    /// A transaction was disposed while still holding a first-attempt,
    /// available promise it created — the caller forgot to attempt or
    /// suppress it.
    #[error("forgotten promise: {0}")]
    ForgottenPromise(String),

    /// No fulfillment handler is registered for this action name.
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

impl EngineError {
    /// Stable machine-readable discriminant, mirroring
    /// [`promise_core::error::ValidationError::code`] for the kinds this
    /// crate adds.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation",
            Self::InvalidState(_) => "InvalidState",
            Self::ConcurrencyConflict => "ConcurrencyConflict",
            Self::LockUnavailable => "LockUnavailable",
            Self::MultipleMatches => "MultipleMatches",
            Self::StorageError(_) => "StorageError",
            Self::Canceled => "Canceled",
            Self::ForgottenPromise(_) => "ForgottenPromise",
            Self::UnknownAction(_) => "UnknownAction",
        }
    }
}
