//! Abstract message broker contract.
//!
//! The publishers depend only on this shape: a broker hands out senders bound
//! to one topic, a sender creates size-bounded batches and sends them. No wire
//! protocol is implied.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DomainError;

/// Content type of every message the publishers produce.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A single message ready to hand to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Message identifier, equal to the source event id.
    pub message_id: Uuid,
    /// Encoded payload.
    pub body: Vec<u8>,
    /// MIME type of `body`.
    pub content_type: String,
    /// Subject label, the fully-qualified event type.
    pub subject: String,
}

impl BrokerMessage {
    /// Builds a JSON message.
    #[must_use]
    pub fn json(message_id: Uuid, body: Vec<u8>, subject: impl Into<String>) -> Self {
        Self {
            message_id,
            body,
            content_type: JSON_CONTENT_TYPE.to_owned(),
            subject: subject.into(),
        }
    }

    /// Bytes this message counts against a batch size limit.
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.body.len() + self.content_type.len() + self.subject.len()
    }
}

/// Entry point of a broker: opens senders bound to a topic.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Opens a sender for `topic`. The caller owns the sender and must close it.
    async fn create_sender(&self, topic: &str) -> Result<Box<dyn TopicSender>, DomainError>;
}

/// A sender bound to one topic. Not shared between concurrent publishes.
#[async_trait]
pub trait TopicSender: Send {
    /// The topic this sender delivers to.
    fn topic(&self) -> &str;

    /// Creates an empty batch sized to the broker's limits.
    async fn create_batch(&mut self) -> Result<Box<dyn MessageBatch>, DomainError>;

    /// Sends one message immediately.
    async fn send(&mut self, message: BrokerMessage) -> Result<(), DomainError>;

    /// Sends every message of `batch`. Success means the broker acknowledged it.
    async fn send_batch(&mut self, batch: Box<dyn MessageBatch>) -> Result<(), DomainError>;

    /// Releases the sender.
    async fn close(self: Box<Self>) -> Result<(), DomainError>;
}

/// A batch of messages bounded by the broker's size limit.
pub trait MessageBatch: Send {
    /// Adds `message` if it fits, otherwise hands it back unchanged.
    ///
    /// # Errors
    ///
    /// Returns the rejected message when adding it would exceed the limit.
    fn try_add(&mut self, message: BrokerMessage) -> Result<(), BrokerMessage>;

    /// Number of messages in the batch.
    fn len(&self) -> usize;

    /// Whether the batch holds no messages.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the batch, returning its messages in insertion order.
    fn into_messages(self: Box<Self>) -> Vec<BrokerMessage>;
}

/// Size limits applied to a [`SizeBoundedBatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Maximum total bytes per batch.
    pub max_bytes: usize,
    /// Optional cap on the number of messages per batch.
    pub max_messages: Option<usize>,
}

impl BatchLimits {
    /// Default batch size of 256 KiB.
    pub const DEFAULT_MAX_BYTES: usize = 256 * 1024;

    /// Limits with a byte bound only.
    #[must_use]
    pub fn bytes(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            max_messages: None,
        }
    }

    /// Adds a message-count bound.
    #[must_use]
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = Some(max_messages);
        self
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self::bytes(Self::DEFAULT_MAX_BYTES)
    }
}

/// The batch used by the bundled brokers.
#[derive(Debug, Clone)]
pub struct SizeBoundedBatch {
    limits: BatchLimits,
    size_in_bytes: usize,
    messages: Vec<BrokerMessage>,
}

impl SizeBoundedBatch {
    /// Creates an empty batch with the given limits.
    #[must_use]
    pub fn new(limits: BatchLimits) -> Self {
        Self {
            limits,
            size_in_bytes: 0,
            messages: Vec::new(),
        }
    }

    /// Total bytes currently held.
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }
}

impl MessageBatch for SizeBoundedBatch {
    fn try_add(&mut self, message: BrokerMessage) -> Result<(), BrokerMessage> {
        if self
            .limits
            .max_messages
            .is_some_and(|max| self.messages.len() >= max)
        {
            return Err(message);
        }
        let size = message.size_in_bytes();
        if self.size_in_bytes + size > self.limits.max_bytes {
            return Err(message);
        }
        self.size_in_bytes += size;
        self.messages.push(message);
        Ok(())
    }

    fn len(&self) -> usize {
        self.messages.len()
    }

    fn into_messages(self: Box<Self>) -> Vec<BrokerMessage> {
        self.messages
    }
}
