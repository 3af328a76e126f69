//! Aggregate root abstraction.

use uuid::Uuid;

use crate::error::DomainError;
use crate::event::DomainEvent;

/// An entity that queues domain events as its state changes.
///
/// Events accumulate in insertion order until the capture step drains them
/// with [`AggregateRoot::take_events`]. Business code only ever appends; the
/// queue is never cleared anywhere except by capture.
pub trait AggregateRoot: Send + Sync {
    /// The event type this aggregate produces.
    type Event: DomainEvent + 'static;

    /// Stable type name used as the persistence key.
    fn aggregate_type(&self) -> &'static str;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Version of the stored snapshot this instance was loaded from, or 0 for
    /// an aggregate that has never been committed.
    fn version(&self) -> i64;

    /// Records the version written by a successful commit.
    fn set_version(&mut self, version: i64);

    /// JSON snapshot of the current state, written alongside the outbox rows.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the state cannot be encoded.
    fn snapshot(&self) -> Result<serde_json::Value, DomainError>;

    /// Read-only view of the events queued since the last capture.
    fn pending_events(&self) -> &[Self::Event];

    /// Returns the queued events and leaves the queue empty.
    fn take_events(&mut self) -> Vec<Self::Event>;
}
