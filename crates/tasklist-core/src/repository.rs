//! Unit of work and aggregate store ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capture::Participant;
use crate::error::DomainError;
use crate::outbox::OutboxMessage;

/// What a successful commit wrote.
#[derive(Debug, Clone, Default)]
pub struct CommitReceipt {
    /// Number of aggregate rows written.
    pub aggregates_written: usize,
    /// The outbox rows inserted by this transaction, in capture order.
    pub outbox_messages: Vec<OutboxMessage>,
}

impl CommitReceipt {
    /// Ids of the outbox rows written by this commit.
    #[must_use]
    pub fn outbox_ids(&self) -> Vec<Uuid> {
        self.outbox_messages.iter().map(|m| m.id).collect()
    }
}

/// One atomic commit of aggregate state plus the outbox rows captured from it.
///
/// Implementations run [`capture_events`](crate::capture::capture_events)
/// before writing, and write the aggregates and the captured outbox rows in a
/// single transaction: both commit or neither does. Each participant is
/// written only if the stored version still equals its expected version; on
/// success every participant is marked committed at the new version.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Persists `participants` and their pending events.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if capture fails,
    /// `DomainError::ConcurrencyConflict` if a participant's stored version is
    /// no longer its expected version, `DomainError::Cancelled` if `cancel`
    /// fires before the commit, and `DomainError::Infrastructure` for storage
    /// failures. In every error case nothing is persisted.
    async fn commit(
        &self,
        participants: &mut [&mut dyn Participant],
        cancel: &CancellationToken,
    ) -> Result<CommitReceipt, DomainError>;
}

/// Persisted snapshot of an aggregate.
#[derive(Debug, Clone)]
pub struct StoredAggregate {
    /// Aggregate type name.
    pub aggregate_type: String,
    /// Aggregate identifier.
    pub aggregate_id: Uuid,
    /// JSON state.
    pub state: serde_json::Value,
    /// Starts at 1 and grows by one with every commit of the aggregate.
    pub version: i64,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
}

/// Read side for aggregate snapshots written by a [`UnitOfWork`].
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Loads the latest snapshot of an aggregate, if one exists.
    async fn load(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
    ) -> Result<Option<StoredAggregate>, DomainError>;
}
