//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::DomainError;

/// Identity, timestamp and routing key shared by every domain event.
///
/// Fixed at construction; nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    /// Unique event identifier, reused as the outbox message id.
    pub id: Uuid,
    /// When the event happened.
    pub occurred_on: DateTime<Utc>,
    /// Broker routing key.
    pub topic: String,
}

impl EventMetadata {
    /// Builds metadata for a new event on `topic`, stamped with a fresh id and
    /// the clock's current time.
    #[must_use]
    pub fn new(topic: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_on: clock.now(),
            topic: topic.into(),
        }
    }
}

/// Trait that all domain events implement.
///
/// Object safe: the capture step, the publishers and the handler registry all
/// work on `&dyn DomainEvent`.
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Fully-qualified event type name. Stored as the outbox `type`, used as the
    /// broker subject and as the dispatch key.
    fn event_type(&self) -> &'static str;

    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;

    /// Serializes the event to its camelCase JSON payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload cannot be encoded.
    fn to_content(&self) -> Result<String, DomainError>;

    /// Event identifier.
    fn id(&self) -> Uuid {
        self.metadata().id
    }

    /// Routing key.
    fn topic(&self) -> &str {
        &self.metadata().topic
    }

    /// Event timestamp.
    fn occurred_on(&self) -> DateTime<Utc> {
        self.metadata().occurred_on
    }
}

/// Returns `true` when `topic` can be routed to a broker destination, i.e. it
/// is not empty and not only whitespace.
#[must_use]
pub fn is_routable_topic(topic: &str) -> bool {
    !topic.trim().is_empty()
}
