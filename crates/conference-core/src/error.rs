//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate (or process) that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// A stored event has no mutator on the aggregate replaying it.
    #[error("no handler on {aggregate_type} for event type {event_type}")]
    MissingHandler {
        /// The aggregate type being reconstituted.
        aggregate_type: &'static str,
        /// The unrecognised event type tag.
        event_type: String,
    },

    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing store could not be reached.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// A command arrived before the state it depends on was recorded.
    /// Redelivery after the earlier command lands succeeds.
    #[error("out of order: {0}")]
    OutOfOrder(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// `start` was called on a receiver that is already running.
    #[error("receiver already started")]
    ReceiverAlreadyStarted,
}

impl DomainError {
    /// Returns true when retrying the same operation later may succeed
    /// without any change on the caller's side.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransportUnavailable(_))
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
