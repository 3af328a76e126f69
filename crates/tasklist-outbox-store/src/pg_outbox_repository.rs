//! `PostgreSQL` implementation of the `OutboxRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use tasklist_core::error::DomainError;
use tasklist_core::outbox::{OutboxMessage, OutboxRepository};

use crate::infrastructure;
use crate::schema::{MARK_PROCESSED, RECORD_ATTEMPT, SELECT_STALE, SELECT_UNPROCESSED_BY_ID};

#[derive(FromRow)]
struct OutboxRow {
    id: Uuid,
    topic: String,
    #[sqlx(rename = "type")]
    message_type: String,
    content: String,
    processed: bool,
    occurred_on: DateTime<Utc>,
    processed_on: Option<DateTime<Utc>>,
    attempts: i32,
}

impl From<OutboxRow> for OutboxMessage {
    fn from(row: OutboxRow) -> Self {
        Self {
            id: row.id,
            topic: row.topic,
            message_type: row.message_type,
            content: row.content,
            processed: row.processed,
            occurred_on: row.occurred_on,
            processed_on: row.processed_on,
            attempts: row.attempts,
        }
    }
}

/// PostgreSQL-backed outbox repository.
#[derive(Debug, Clone)]
pub struct PgOutboxRepository {
    pool: PgPool,
}

impl PgOutboxRepository {
    /// Creates a new `PgOutboxRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxRepository for PgOutboxRepository {
    async fn find_unprocessed(&self, ids: &[Uuid]) -> Result<Vec<OutboxMessage>, DomainError> {
        let rows = sqlx::query_as::<_, OutboxRow>(SELECT_UNPROCESSED_BY_ID)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(rows.into_iter().map(OutboxMessage::from).collect())
    }

    async fn mark_processed(
        &self,
        ids: &[Uuid],
        processed_on: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query(MARK_PROCESSED)
            .bind(ids)
            .bind(processed_on)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(result.rows_affected())
    }

    async fn find_stale(
        &self,
        older_than: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<OutboxMessage>, DomainError> {
        let rows = sqlx::query_as::<_, OutboxRow>(SELECT_STALE)
            .bind(older_than)
            .bind(max_attempts)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(rows.into_iter().map(OutboxMessage::from).collect())
    }

    async fn record_attempt(&self, ids: &[Uuid]) -> Result<(), DomainError> {
        sqlx::query(RECORD_ATTEMPT)
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }
}
