//! Pre-commit capture of pending domain events into outbox messages.

use uuid::Uuid;

use crate::aggregate::AggregateRoot;
use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::outbox::OutboxMessage;

/// Object-safe view of an aggregate taking part in a unit of work.
///
/// Implemented for every [`AggregateRoot`], so a single commit can carry
/// aggregates with different event types.
pub trait Participant: Send + Sync {
    /// Stable type name used as the persistence key.
    fn aggregate_type(&self) -> &'static str;

    /// Aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// The stored version a commit must find before it may write.
    fn expected_version(&self) -> i64;

    /// Called after a commit wrote `version`.
    fn mark_committed(&mut self, version: i64);

    /// JSON snapshot of the current state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the state cannot be encoded.
    fn snapshot(&self) -> Result<serde_json::Value, DomainError>;

    /// The events queued since the last capture, in insertion order.
    fn pending(&self) -> Vec<&dyn DomainEvent>;

    /// Drops the queued events, returning how many there were.
    fn discard_pending(&mut self) -> usize;
}

impl<A: AggregateRoot> Participant for A {
    fn aggregate_type(&self) -> &'static str {
        AggregateRoot::aggregate_type(self)
    }

    fn aggregate_id(&self) -> Uuid {
        AggregateRoot::aggregate_id(self)
    }

    fn expected_version(&self) -> i64 {
        self.version()
    }

    fn mark_committed(&mut self, version: i64) {
        self.set_version(version);
    }

    fn snapshot(&self) -> Result<serde_json::Value, DomainError> {
        AggregateRoot::snapshot(self)
    }

    fn pending(&self) -> Vec<&dyn DomainEvent> {
        self.pending_events()
            .iter()
            .map(|event| event as &dyn DomainEvent)
            .collect()
    }

    fn discard_pending(&mut self) -> usize {
        self.take_events().len()
    }
}

/// Harvests every pending event of `participants` into outbox messages.
///
/// Messages come out in participant order and, within a participant, in the
/// order the events were queued. All events are serialized before any queue is
/// touched: if one fails, the error is returned and every participant keeps its
/// events. On success every participant's queue is empty, so capturing again
/// without new mutations yields nothing.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if any event cannot be encoded. The
/// caller must abort the enclosing transaction.
pub fn capture_events(
    participants: &mut [&mut dyn Participant],
) -> Result<Vec<OutboxMessage>, DomainError> {
    let mut messages = Vec::new();
    for participant in participants.iter() {
        for event in participant.pending() {
            let message = OutboxMessage::from_event(event).map_err(|err| {
                DomainError::Serialization(format!(
                    "{} {} on {} {}: {err}",
                    event.event_type(),
                    event.id(),
                    participant.aggregate_type(),
                    participant.aggregate_id(),
                ))
            })?;
            messages.push(message);
        }
    }

    for participant in participants.iter_mut() {
        participant.discard_pending();
    }

    Ok(messages)
}
