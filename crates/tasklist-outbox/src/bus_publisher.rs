//! Single-event publishing straight to the broker.

use std::sync::Arc;

use async_trait::async_trait;
use tasklist_core::broker::{BrokerMessage, MessageBroker};
use tasklist_core::error::DomainError;
use tasklist_core::event::{DomainEvent, is_routable_topic};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Sends one event to its topic.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes `event` to the topic in its metadata.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTopic` for a blank topic, before any broker
    /// call, and propagates broker and cancellation errors.
    async fn send(
        &self,
        event: &dyn DomainEvent,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError>;
}

/// Publishes an event immediately, outside any transaction.
///
/// Nothing is written to the outbox: if the send fails, the event is lost
/// unless the caller retries. Use the outbox path when the event has to
/// survive a crash.
pub struct BusPublisher {
    broker: Arc<dyn MessageBroker>,
}

impl BusPublisher {
    /// Creates a publisher over `broker`.
    #[must_use]
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self { broker }
    }
}

impl std::fmt::Debug for BusPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusPublisher").finish_non_exhaustive()
    }
}

#[async_trait]
impl EventPublisher for BusPublisher {
    #[instrument(skip_all, fields(event_type = event.event_type(), event_id = %event.id()))]
    async fn send(
        &self,
        event: &dyn DomainEvent,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        let topic = event.topic();
        if !is_routable_topic(topic) {
            return Err(DomainError::InvalidTopic(format!(
                "event {} of type {} has an empty topic",
                event.id(),
                event.event_type()
            )));
        }

        // The body is the event itself; the batch path wraps it in the outbox row.
        let body = event.to_content()?.into_bytes();
        let message = BrokerMessage::json(event.id(), body, event.event_type());
        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let mut sender = self.broker.create_sender(topic).await?;
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DomainError::Cancelled),
            result = sender.send(message) => result,
        };
        if let Err(err) = sender.close().await {
            warn!(topic, error = %err, "failed to close broker sender");
        }
        if outcome.is_ok() {
            debug!(topic, "event published");
        }
        outcome
    }
}
