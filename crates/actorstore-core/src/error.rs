//! Domain error types.

use thiserror::Error;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(String),

    /// The stream's current version did not match the expected version
    /// supplied on append.
    #[error("concurrency conflict on stream {stream}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream (aggregate identity) that had the conflict.
        stream: String,
        /// The expected version.
        expected: u64,
        /// The actual version found.
        actual: u64,
    },

    /// A write lost an optimistic concurrency race. This is what callers of
    /// the storage engine see instead of `ConcurrencyConflict`.
    #[error("inconsistent state: {0}")]
    InconsistentState(String),

    /// Replay met an event type tag with no registered variant.
    #[error("unsupported event type: {0}")]
    UnsupportedEvent(String),

    /// A stored payload could not be decoded into its resolved type.
    #[error("failed to decode {type_tag}: {reason}")]
    DecodeFailure {
        /// The type tag that was being decoded.
        type_tag: String,
        /// What went wrong.
        reason: String,
    },

    /// An operation was attempted in a state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
