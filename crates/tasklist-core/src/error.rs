//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type shared by the domain, the outbox pipeline and its adapters.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("{aggregate_type} not found: {id}")]
    AggregateNotFound {
        /// Aggregate type name.
        aggregate_type: &'static str,
        /// The identifier that was looked up.
        id: Uuid,
    },

    /// The aggregate was changed by another commit since it was loaded.
    #[error("{aggregate_type} {aggregate_id} was modified concurrently")]
    ConcurrencyConflict {
        /// Aggregate type name.
        aggregate_type: &'static str,
        /// The aggregate that could not be written.
        aggregate_id: Uuid,
        /// The version the commit expected to replace.
        expected: i64,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// A domain event or outbox envelope could not be serialized.
    ///
    /// Raised during capture this aborts the whole commit.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The single-event publish path was handed an event without a usable topic.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// A message does not fit even an empty broker batch. Not retryable.
    #[error("message {message_id} is too large for a batch on topic {topic}")]
    MessageTooLarge {
        /// The outbox message that was rejected.
        message_id: Uuid,
        /// The topic it was routed to.
        topic: String,
    },

    /// A second handler was registered for an event type that already has one.
    #[error("a handler is already registered for {0}")]
    DuplicateHandler(&'static str),

    /// The broker rejected or failed a send. Retry policy belongs to the caller.
    #[error("broker error: {0}")]
    Broker(String),

    /// The operation observed its cancellation token before completing.
    #[error("operation cancelled")]
    Cancelled,

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
