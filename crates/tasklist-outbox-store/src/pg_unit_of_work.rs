//! `PostgreSQL` implementation of the `UnitOfWork` trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use tasklist_core::capture::{Participant, capture_events};
use tasklist_core::clock::Clock;
use tasklist_core::error::DomainError;
use tasklist_core::outbox::OutboxMessage;
use tasklist_core::repository::{CommitReceipt, StoredAggregate, UnitOfWork};

use crate::infrastructure;
use crate::schema::{INSERT_OUTBOX_MESSAGE, UPSERT_AGGREGATE};

/// Writes aggregate snapshots and outbox rows in a single transaction.
#[derive(Clone)]
pub struct PgUnitOfWork {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PgUnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgUnitOfWork")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl PgUnitOfWork {
    /// Creates a new `PgUnitOfWork`.
    #[must_use]
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    #[instrument(skip_all, fields(participants = participants.len()))]
    async fn commit(
        &self,
        participants: &mut [&mut dyn Participant],
        cancel: &CancellationToken,
    ) -> Result<CommitReceipt, DomainError> {
        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        // Everything that can fail without the database runs before capture
        // drains the pending queues.
        let snapshots = snapshot_all(participants, self.clock.now())?;
        let captured = capture_events(participants)?;

        let mut tx = self.pool.begin().await.map_err(infrastructure)?;
        let aggregates_written = snapshots.len();
        for (participant, snapshot) in participants.iter().zip(snapshots) {
            let expected = snapshot.version - 1;
            if !upsert_aggregate(&mut tx, snapshot).await? {
                tx.rollback().await.map_err(infrastructure)?;
                warn!(
                    aggregate_type = participant.aggregate_type(),
                    aggregate_id = %participant.aggregate_id(),
                    expected,
                    "stale aggregate version; transaction rolled back"
                );
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_type: participant.aggregate_type(),
                    aggregate_id: participant.aggregate_id(),
                    expected,
                });
            }
        }
        let mut inserted = Vec::with_capacity(captured.len());
        for message in captured {
            if insert_outbox_message(&mut tx, &message).await? {
                inserted.push(message);
            }
        }

        if cancel.is_cancelled() {
            tx.rollback().await.map_err(infrastructure)?;
            warn!("commit cancelled; transaction rolled back");
            return Err(DomainError::Cancelled);
        }
        tx.commit().await.map_err(infrastructure)?;
        for participant in participants.iter_mut() {
            let version = participant.expected_version() + 1;
            participant.mark_committed(version);
        }

        debug!(
            aggregates = aggregates_written,
            outbox_messages = inserted.len(),
            "unit of work committed"
        );
        Ok(CommitReceipt {
            aggregates_written,
            outbox_messages: inserted,
        })
    }
}

fn snapshot_all(
    participants: &[&mut dyn Participant],
    updated_at: DateTime<Utc>,
) -> Result<Vec<StoredAggregate>, DomainError> {
    participants
        .iter()
        .map(|participant| {
            Ok(StoredAggregate {
                aggregate_type: participant.aggregate_type().to_owned(),
                aggregate_id: participant.aggregate_id(),
                state: participant.snapshot()?,
                version: participant.expected_version() + 1,
                updated_at,
            })
        })
        .collect()
}

/// Returns `false` when the stored version is not the one `snapshot` replaces.
async fn upsert_aggregate(
    tx: &mut Transaction<'_, Postgres>,
    snapshot: StoredAggregate,
) -> Result<bool, DomainError> {
    let result = sqlx::query(UPSERT_AGGREGATE)
        .bind(snapshot.aggregate_type)
        .bind(snapshot.aggregate_id)
        .bind(snapshot.state)
        .bind(snapshot.version)
        .bind(snapshot.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(infrastructure)?;
    Ok(result.rows_affected() == 1)
}

/// Returns `false` when a row with the same id already exists.
async fn insert_outbox_message(
    tx: &mut Transaction<'_, Postgres>,
    message: &OutboxMessage,
) -> Result<bool, DomainError> {
    let result = sqlx::query(INSERT_OUTBOX_MESSAGE)
        .bind(message.id)
        .bind(&message.topic)
        .bind(&message.message_type)
        .bind(&message.content)
        .bind(message.processed)
        .bind(message.occurred_on)
        .bind(message.processed_on)
        .bind(message.attempts)
        .execute(&mut **tx)
        .await
        .map_err(infrastructure)?;
    Ok(result.rows_affected() == 1)
}
