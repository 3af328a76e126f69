//! PostgreSQL persistence for the task-list outbox.
//!
//! [`PgUnitOfWork`] writes aggregate snapshots and their captured outbox rows in
//! one transaction. [`PgOutboxRepository`] serves the publisher and the sweep
//! afterwards, and [`PgAggregateStore`] reads snapshots back.

pub mod pg_aggregate_store;
pub mod pg_outbox_repository;
pub mod pg_unit_of_work;
pub mod schema;

pub use pg_aggregate_store::PgAggregateStore;
pub use pg_outbox_repository::PgOutboxRepository;
pub use pg_unit_of_work::PgUnitOfWork;

use tasklist_core::error::DomainError;

/// Embedded migrations from the workspace `migrations/` directory.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

pub(crate) fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}
