//! Wires the outbox pipeline, the task-list handlers and the sweep together.

use std::sync::Arc;

use sqlx::PgPool;
use tasklist_core::broker::MessageBroker;
use tasklist_core::clock::Clock;
use tasklist_core::error::DomainError;
use tasklist_core::outbox::OutboxRepository;
use tasklist_core::repository::{AggregateStore, UnitOfWork};
use tasklist_outbox::{
    BatchPublisher, BusPublisher, EventHandlerRegistry, EventPublisher, OutboxSweeper,
    PublishingUnitOfWork, SweepConfig,
};
use tasklist_outbox_store::{PgAggregateStore, PgOutboxRepository, PgUnitOfWork};
use tasklist_todo::application::event_handlers::register_todo_handlers;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// The storage side of the service.
#[derive(Clone)]
pub struct Adapters {
    pub aggregates: Arc<dyn AggregateStore>,
    /// Commits without publishing. [`assemble`] wraps it.
    pub unit_of_work: Arc<dyn UnitOfWork>,
    pub outbox: Arc<dyn OutboxRepository>,
}

impl Adapters {
    /// Postgres-backed adapters sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool, clock: Arc<dyn Clock>) -> Self {
        Self {
            aggregates: Arc::new(PgAggregateStore::new(pool.clone())),
            unit_of_work: Arc::new(PgUnitOfWork::new(pool.clone(), clock)),
            outbox: Arc::new(PgOutboxRepository::new(pool.clone())),
        }
    }
}

/// Everything the binary runs.
#[derive(Debug)]
pub struct Services {
    pub state: AppState,
    pub sweeper: Arc<OutboxSweeper>,
}

/// Builds the request state and the sweeper over `adapters` and `broker`.
///
/// Commits go through a [`PublishingUnitOfWork`], so every outbox row is
/// published right after its transaction; the sweeper republishes what that
/// step leaves behind.
///
/// # Errors
///
/// Returns `DomainError::DuplicateHandler` if handler registration clashes.
pub fn assemble(
    adapters: Adapters,
    broker: Arc<dyn MessageBroker>,
    clock: Arc<dyn Clock>,
    sweep: SweepConfig,
    shutdown: CancellationToken,
) -> Result<Services, DomainError> {
    let publisher = Arc::new(BatchPublisher::new(
        Arc::clone(&broker),
        Arc::clone(&adapters.outbox),
        Arc::clone(&clock),
    ));
    let unit_of_work = Arc::new(PublishingUnitOfWork::new(
        adapters.unit_of_work,
        Arc::clone(&publisher),
    ));

    let bus: Arc<dyn EventPublisher> = Arc::new(BusPublisher::new(broker));
    let mut handlers = EventHandlerRegistry::new();
    register_todo_handlers(&mut handlers, &bus)?;

    let sweeper = Arc::new(OutboxSweeper::new(
        adapters.outbox,
        publisher,
        Arc::clone(&clock),
        sweep,
    ));
    let state = AppState::new(
        clock,
        adapters.aggregates,
        unit_of_work,
        Arc::new(handlers),
        shutdown,
    );

    Ok(Services { state, sweeper })
}
