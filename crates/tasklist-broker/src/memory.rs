//! In-process broker that records every delivery.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tasklist_core::broker::{
    BatchLimits, BrokerMessage, MessageBatch, MessageBroker, SizeBoundedBatch, TopicSender,
};
use tasklist_core::error::DomainError;

/// One acknowledged send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Destination topic.
    pub topic: String,
    /// Messages delivered, in order.
    pub messages: Vec<BrokerMessage>,
    /// Whether they arrived as a batch rather than a single send.
    pub batched: bool,
}

#[derive(Debug, Default)]
struct Ledger {
    senders_opened: Vec<String>,
    senders_closed: usize,
    deliveries: Vec<Delivery>,
}

/// Broker that keeps every delivery in memory.
///
/// Used when no external broker is configured and by the tests to observe
/// exactly what the publishers sent.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    limits: BatchLimits,
    ledger: Arc<Mutex<Ledger>>,
}

impl InMemoryBroker {
    /// Creates a broker whose batches use `limits`.
    #[must_use]
    pub fn new(limits: BatchLimits) -> Self {
        Self {
            limits,
            ledger: Arc::default(),
        }
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every delivery so far, in order.
    #[must_use]
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.ledger().deliveries.clone()
    }

    /// Messages delivered to `topic`, flattened across sends.
    #[must_use]
    pub fn messages_for(&self, topic: &str) -> Vec<BrokerMessage> {
        self.ledger()
            .deliveries
            .iter()
            .filter(|delivery| delivery.topic == topic)
            .flat_map(|delivery| delivery.messages.iter().cloned())
            .collect()
    }

    /// Topics senders were opened for, in order.
    #[must_use]
    pub fn senders_opened(&self) -> Vec<String> {
        self.ledger().senders_opened.clone()
    }

    /// Senders opened but not yet closed.
    #[must_use]
    pub fn open_senders(&self) -> usize {
        let ledger = self.ledger();
        ledger.senders_opened.len() - ledger.senders_closed
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn create_sender(&self, topic: &str) -> Result<Box<dyn TopicSender>, DomainError> {
        self.ledger().senders_opened.push(topic.to_owned());
        Ok(Box::new(InMemorySender {
            topic: topic.to_owned(),
            broker: self.clone(),
        }))
    }
}

struct InMemorySender {
    topic: String,
    broker: InMemoryBroker,
}

impl InMemorySender {
    fn record(&self, messages: Vec<BrokerMessage>, batched: bool) {
        self.broker.ledger().deliveries.push(Delivery {
            topic: self.topic.clone(),
            messages,
            batched,
        });
    }
}

#[async_trait]
impl TopicSender for InMemorySender {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn create_batch(&mut self) -> Result<Box<dyn MessageBatch>, DomainError> {
        Ok(Box::new(SizeBoundedBatch::new(self.broker.limits)))
    }

    async fn send(&mut self, message: BrokerMessage) -> Result<(), DomainError> {
        self.record(vec![message], false);
        Ok(())
    }

    async fn send_batch(&mut self, batch: Box<dyn MessageBatch>) -> Result<(), DomainError> {
        self.record(batch.into_messages(), true);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DomainError> {
        self.broker.ledger().senders_closed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn message() -> BrokerMessage {
        BrokerMessage::json(Uuid::new_v4(), b"{}".to_vec(), "Subject")
    }

    #[tokio::test]
    async fn test_records_batches_and_single_sends_per_topic() {
        // Arrange
        let broker = InMemoryBroker::default();
        let mut sender = broker.create_sender("A").await.unwrap();
        let mut batch = sender.create_batch().await.unwrap();
        batch.try_add(message()).unwrap();
        batch.try_add(message()).unwrap();

        // Act
        sender.send_batch(batch).await.unwrap();
        sender.send(message()).await.unwrap();
        sender.close().await.unwrap();

        // Assert
        let deliveries = broker.deliveries();
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries[0].batched);
        assert_eq!(deliveries[0].messages.len(), 2);
        assert!(!deliveries[1].batched);
        assert_eq!(broker.messages_for("A").len(), 3);
        assert!(broker.messages_for("B").is_empty());
        assert_eq!(broker.open_senders(), 0);
    }

    #[tokio::test]
    async fn test_batches_use_configured_limits() {
        let broker = InMemoryBroker::new(BatchLimits::default().with_max_messages(1));
        let mut sender = broker.create_sender("A").await.unwrap();
        let mut batch = sender.create_batch().await.unwrap();

        batch.try_add(message()).unwrap();

        assert!(batch.try_add(message()).is_err());
        assert_eq!(broker.open_senders(), 1);
    }
}
