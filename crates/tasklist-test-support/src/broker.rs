//! `MessageBroker` doubles that fail or stall on demand.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tasklist_core::broker::{
    BatchLimits, BrokerMessage, MessageBatch, MessageBroker, SizeBoundedBatch, TopicSender,
};
use tasklist_core::error::DomainError;
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailurePoint {
    CreateSender,
    Send,
}

/// A broker that returns `DomainError::Broker` either when a sender is opened
/// or on every send. Counts closed senders so tests can check cleanup.
#[derive(Debug)]
pub struct FailingBroker {
    failure: FailurePoint,
    closed: Arc<AtomicUsize>,
}

impl FailingBroker {
    /// Fails every `create_sender` call.
    #[must_use]
    pub fn on_create_sender() -> Self {
        Self {
            failure: FailurePoint::CreateSender,
            closed: Arc::default(),
        }
    }

    /// Opens senders normally but fails every send.
    #[must_use]
    pub fn on_send() -> Self {
        Self {
            failure: FailurePoint::Send,
            closed: Arc::default(),
        }
    }

    /// Number of senders closed so far.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBroker for FailingBroker {
    async fn create_sender(&self, topic: &str) -> Result<Box<dyn TopicSender>, DomainError> {
        if self.failure == FailurePoint::CreateSender {
            return Err(DomainError::Broker("broker unreachable".into()));
        }
        Ok(Box::new(FailingSender {
            topic: topic.to_owned(),
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct FailingSender {
    topic: String,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl TopicSender for FailingSender {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn create_batch(&mut self) -> Result<Box<dyn MessageBatch>, DomainError> {
        Ok(Box::new(SizeBoundedBatch::new(BatchLimits::default())))
    }

    async fn send(&mut self, _message: BrokerMessage) -> Result<(), DomainError> {
        Err(DomainError::Broker("send rejected".into()))
    }

    async fn send_batch(&mut self, _batch: Box<dyn MessageBatch>) -> Result<(), DomainError> {
        Err(DomainError::Broker("batch rejected".into()))
    }

    async fn close(self: Box<Self>) -> Result<(), DomainError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StallState {
    acknowledged: Mutex<Vec<Uuid>>,
    batches: AtomicUsize,
    closed: AtomicUsize,
    stalled: Notify,
}

/// A broker that acknowledges the first `ack_batches` batches and then never
/// completes a send. [`StallingBroker::wait_until_stalled`] resolves once a
/// send is hanging.
#[derive(Debug)]
pub struct StallingBroker {
    ack_batches: usize,
    limits: BatchLimits,
    state: Arc<StallState>,
}

impl StallingBroker {
    #[must_use]
    pub fn after(ack_batches: usize, limits: BatchLimits) -> Self {
        Self {
            ack_batches,
            limits,
            state: Arc::default(),
        }
    }

    /// Waits until a send has stalled.
    pub async fn wait_until_stalled(&self) {
        self.state.stalled.notified().await;
    }

    /// Ids of acknowledged messages, in send order.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn acknowledged(&self) -> Vec<Uuid> {
        self.state.acknowledged.lock().unwrap().clone()
    }

    /// Number of senders closed so far.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBroker for StallingBroker {
    async fn create_sender(&self, topic: &str) -> Result<Box<dyn TopicSender>, DomainError> {
        Ok(Box::new(StallingSender {
            topic: topic.to_owned(),
            ack_batches: self.ack_batches,
            limits: self.limits,
            state: Arc::clone(&self.state),
        }))
    }
}

struct StallingSender {
    topic: String,
    ack_batches: usize,
    limits: BatchLimits,
    state: Arc<StallState>,
}

impl StallingSender {
    async fn deliver(&self, messages: Vec<BrokerMessage>) -> Result<(), DomainError> {
        if self.state.batches.fetch_add(1, Ordering::SeqCst) >= self.ack_batches {
            self.state.stalled.notify_one();
            std::future::pending::<()>().await;
        }
        self.state
            .acknowledged
            .lock()
            .unwrap()
            .extend(messages.iter().map(|message| message.message_id));
        Ok(())
    }
}

#[async_trait]
impl TopicSender for StallingSender {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn create_batch(&mut self) -> Result<Box<dyn MessageBatch>, DomainError> {
        Ok(Box::new(SizeBoundedBatch::new(self.limits)))
    }

    async fn send(&mut self, message: BrokerMessage) -> Result<(), DomainError> {
        self.deliver(vec![message]).await
    }

    async fn send_batch(&mut self, batch: Box<dyn MessageBatch>) -> Result<(), DomainError> {
        self.deliver(batch.into_messages()).await
    }

    async fn close(self: Box<Self>) -> Result<(), DomainError> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
