//! Broker that writes every message to the tracing log.

use async_trait::async_trait;
use tasklist_core::broker::{
    BatchLimits, BrokerMessage, MessageBatch, MessageBroker, SizeBoundedBatch, TopicSender,
};
use tasklist_core::error::DomainError;
use tracing::{debug, info};

/// Stand-in broker for local runs: acknowledges everything and logs it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBroker {
    limits: BatchLimits,
}

impl LogBroker {
    #[must_use]
    pub fn new(limits: BatchLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl MessageBroker for LogBroker {
    async fn create_sender(&self, topic: &str) -> Result<Box<dyn TopicSender>, DomainError> {
        debug!(topic, "opening log sender");
        Ok(Box::new(LogSender {
            topic: topic.to_owned(),
            limits: self.limits,
        }))
    }
}

struct LogSender {
    topic: String,
    limits: BatchLimits,
}

impl LogSender {
    fn emit(&self, message: &BrokerMessage) {
        info!(
            topic = %self.topic,
            message_id = %message.message_id,
            subject = %message.subject,
            content_type = %message.content_type,
            bytes = message.body.len(),
            body = %String::from_utf8_lossy(&message.body),
            "message delivered"
        );
    }
}

#[async_trait]
impl TopicSender for LogSender {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn create_batch(&mut self) -> Result<Box<dyn MessageBatch>, DomainError> {
        Ok(Box::new(SizeBoundedBatch::new(self.limits)))
    }

    async fn send(&mut self, message: BrokerMessage) -> Result<(), DomainError> {
        self.emit(&message);
        Ok(())
    }

    async fn send_batch(&mut self, batch: Box<dyn MessageBatch>) -> Result<(), DomainError> {
        let messages = batch.into_messages();
        debug!(topic = %self.topic, size = messages.len(), "delivering batch");
        for message in &messages {
            self.emit(message);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DomainError> {
        debug!(topic = %self.topic, "closing log sender");
        Ok(())
    }
}
