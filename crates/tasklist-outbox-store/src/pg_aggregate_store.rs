//! `PostgreSQL` implementation of the `AggregateStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use tasklist_core::error::DomainError;
use tasklist_core::repository::{AggregateStore, StoredAggregate};

use crate::infrastructure;
use crate::schema::SELECT_AGGREGATE;

#[derive(FromRow)]
struct AggregateRow {
    aggregate_type: String,
    aggregate_id: Uuid,
    state: serde_json::Value,
    version: i64,
    updated_at: DateTime<Utc>,
}

/// Reads aggregate snapshots written by `PgUnitOfWork`.
#[derive(Debug, Clone)]
pub struct PgAggregateStore {
    pool: PgPool,
}

impl PgAggregateStore {
    /// Creates a new `PgAggregateStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AggregateStore for PgAggregateStore {
    async fn load(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
    ) -> Result<Option<StoredAggregate>, DomainError> {
        let row = sqlx::query_as::<_, AggregateRow>(SELECT_AGGREGATE)
            .bind(aggregate_type)
            .bind(aggregate_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(row.map(|row| StoredAggregate {
            aggregate_type: row.aggregate_type,
            aggregate_id: row.aggregate_id,
            state: row.state,
            version: row.version,
            updated_at: row.updated_at,
        }))
    }
}
