//! Shared application state.

use std::sync::Arc;

use tasklist_core::clock::Clock;
use tasklist_core::repository::{AggregateStore, UnitOfWork};
use tasklist_outbox::EventHandlerRegistry;
use tokio_util::sync::CancellationToken;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Clock used for event timestamps.
    pub clock: Arc<dyn Clock>,
    /// Reads committed aggregates.
    pub aggregates: Arc<dyn AggregateStore>,
    /// Commits aggregates together with their outbox rows.
    pub unit_of_work: Arc<dyn UnitOfWork>,
    /// Event handlers registered at startup. Routes that dispatch an event
    /// straight to its handlers, without an outbox row, go through this
    /// registry.
    pub handlers: Arc<EventHandlerRegistry>,
    /// Fires when the server is shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        aggregates: Arc<dyn AggregateStore>,
        unit_of_work: Arc<dyn UnitOfWork>,
        handlers: Arc<EventHandlerRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            clock,
            aggregates,
            unit_of_work,
            handlers,
            shutdown,
        }
    }

    /// A token for one request, cancelled when the server shuts down.
    #[must_use]
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("handlers", &self.handlers.event_types())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}
