//! Outbox message model and repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::event::{DomainEvent, is_routable_topic};

/// Durable record of a domain event awaiting delivery.
///
/// Written in the same transaction as the business change that produced the
/// event. `id`, `topic`, `message_type`, `content` and `occurred_on` never
/// change after insertion; `processed` only moves from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxMessage {
    /// Same identity as the source event, so consumers can detect redelivery.
    pub id: Uuid,
    /// Broker routing key.
    pub topic: String,
    /// Fully-qualified event type name.
    #[serde(rename = "type")]
    pub message_type: String,
    /// The event serialized as camelCase JSON.
    pub content: String,
    /// Set once the broker has acknowledged the message.
    pub processed: bool,
    /// When the source event happened.
    pub occurred_on: DateTime<Utc>,
    /// When delivery was acknowledged.
    pub processed_on: Option<DateTime<Utc>>,
    /// Number of background redelivery attempts made so far.
    pub attempts: i32,
}

impl OutboxMessage {
    /// Builds an unprocessed outbox message from a domain event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the event payload cannot be encoded.
    pub fn from_event(event: &dyn DomainEvent) -> Result<Self, DomainError> {
        let metadata = event.metadata();
        Ok(Self {
            id: metadata.id,
            topic: metadata.topic.clone(),
            message_type: event.event_type().to_owned(),
            content: event.to_content()?,
            processed: false,
            occurred_on: metadata.occurred_on,
            processed_on: None,
            attempts: 0,
        })
    }

    /// Whether the topic can be routed to a broker destination.
    #[must_use]
    pub fn has_routable_topic(&self) -> bool {
        is_routable_topic(&self.topic)
    }

    /// Marks the message processed. A message that is already processed keeps
    /// its original `processed_on`.
    pub fn mark_processed(&mut self, at: DateTime<Utc>) {
        if !self.processed {
            self.processed = true;
            self.processed_on = Some(at);
        }
    }

    /// Deserializes `content` back into a concrete event type.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the content does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DomainError> {
        Ok(serde_json::from_str(&self.content)?)
    }
}

/// Persistence port for outbox rows after they have been committed.
///
/// Inserting rows is the unit of work's job; this trait covers everything the
/// publisher and the sweep need afterwards.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Returns the unprocessed rows among `ids`, ordered by `occurred_on`.
    async fn find_unprocessed(&self, ids: &[Uuid]) -> Result<Vec<OutboxMessage>, DomainError>;

    /// Marks the given rows processed at `processed_on`. Rows that are already
    /// processed are left untouched. Returns the number of rows that changed.
    async fn mark_processed(
        &self,
        ids: &[Uuid],
        processed_on: DateTime<Utc>,
    ) -> Result<u64, DomainError>;

    /// Unprocessed rows that occurred before `older_than` and have been
    /// attempted fewer than `max_attempts` times, oldest first, at most `limit`.
    async fn find_stale(
        &self,
        older_than: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<OutboxMessage>, DomainError>;

    /// Increments the attempt counter of the given rows.
    async fn record_attempt(&self, ids: &[Uuid]) -> Result<(), DomainError>;
}
