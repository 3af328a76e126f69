//! Test events and aggregates.

use serde::{Deserialize, Serialize};
use tasklist_core::aggregate::AggregateRoot;
use tasklist_core::error::DomainError;
use tasklist_core::event::{DomainEvent, EventMetadata};
use tasklist_core::outbox::OutboxMessage;
use uuid::Uuid;

use crate::clock::FixedClock;

/// A minimal domain event with a free-form payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEvent {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub payload: String,
    /// When set, `to_content` fails as if the payload could not be encoded.
    #[serde(skip)]
    pub unserializable: bool,
}

impl TestEvent {
    /// Type name reported by every `TestEvent`.
    pub const EVENT_TYPE: &'static str = "tasklist_test_support::TestEvent";

    /// A new event on `topic`, stamped by the default [`FixedClock`].
    #[must_use]
    pub fn new(topic: &str) -> Self {
        Self {
            metadata: EventMetadata::new(topic, &FixedClock::default()),
            payload: "payload".to_owned(),
            unserializable: false,
        }
    }

    /// A new event whose payload is `len` bytes long.
    #[must_use]
    pub fn with_payload_len(topic: &str, len: usize) -> Self {
        Self {
            payload: "x".repeat(len),
            ..Self::new(topic)
        }
    }

    /// A new event that fails to serialize.
    #[must_use]
    pub fn unserializable(topic: &str) -> Self {
        Self {
            unserializable: true,
            ..Self::new(topic)
        }
    }
}

impl DomainEvent for TestEvent {
    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn to_content(&self) -> Result<String, DomainError> {
        if self.unserializable {
            return Err(DomainError::Serialization(
                "test event refused to serialize".into(),
            ));
        }
        Ok(serde_json::to_string(self)?)
    }
}

/// An unprocessed outbox row built from a fresh [`TestEvent`] on `topic`.
///
/// # Panics
///
/// Never in practice: `TestEvent::new` always serializes.
#[must_use]
pub fn outbox_message(topic: &str) -> OutboxMessage {
    OutboxMessage::from_event(&TestEvent::new(topic)).expect("test event serializes")
}

/// A counter aggregate that queues a [`TestEvent`] per recorded change.
#[derive(Debug, Clone)]
pub struct TestAggregate {
    pub id: Uuid,
    pub changes: u32,
    pub version: i64,
    pending: Vec<TestEvent>,
}

impl Default for TestAggregate {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAggregate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            changes: 0,
            version: 0,
            pending: Vec::new(),
        }
    }

    /// Records a change and queues an event on `topic`. Returns the event id.
    pub fn record(&mut self, topic: &str) -> Uuid {
        self.push(TestEvent::new(topic))
    }

    /// Records a change whose event will fail to serialize.
    pub fn record_unserializable(&mut self, topic: &str) -> Uuid {
        self.push(TestEvent::unserializable(topic))
    }

    fn push(&mut self, event: TestEvent) -> Uuid {
        self.changes += 1;
        let id = event.id();
        self.pending.push(event);
        id
    }
}

impl AggregateRoot for TestAggregate {
    type Event = TestEvent;

    fn aggregate_type(&self) -> &'static str {
        "TestAggregate"
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn snapshot(&self) -> Result<serde_json::Value, DomainError> {
        Ok(serde_json::json!({ "id": self.id, "changes": self.changes }))
    }

    fn pending_events(&self) -> &[TestEvent] {
        &self.pending
    }

    fn take_events(&mut self) -> Vec<TestEvent> {
        std::mem::take(&mut self.pending)
    }
}
