//! Event-type keyed handler registry.
//!
//! Handlers are registered explicitly at startup. Each event type has at most
//! one handler; dispatching an event nobody handles is logged and skipped.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use tasklist_core::error::DomainError;
use tasklist_core::event::DomainEvent;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::bus_publisher::EventPublisher;

/// Reacts to one kind of domain event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles `event`.
    ///
    /// # Errors
    ///
    /// Whatever the handler's side effect returns.
    async fn handle(
        &self,
        event: &dyn DomainEvent,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError>;
}

/// Handler that forwards the event to an [`EventPublisher`].
pub struct ForwardToPublisher<P: ?Sized> {
    publisher: Arc<P>,
}

impl<P: ?Sized> ForwardToPublisher<P> {
    /// Wraps `publisher`.
    #[must_use]
    pub fn new(publisher: Arc<P>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventHandler for ForwardToPublisher<P> {
    async fn handle(
        &self,
        event: &dyn DomainEvent,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        self.publisher.send(event, cancel).await
    }
}

/// What happened to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The registered handler ran successfully.
    Handled,
    /// No handler is registered for the event type.
    NoHandler,
}

/// Maps event type names to their handler.
#[derive(Default)]
pub struct EventHandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for EventHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlerRegistry")
            .field("event_types", &self.event_types())
            .finish()
    }
}

impl EventHandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event_type`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DuplicateHandler` if the type already has one.
    pub fn register(
        &mut self,
        event_type: &'static str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), DomainError> {
        match self.handlers.entry(event_type) {
            Entry::Occupied(_) => Err(DomainError::DuplicateHandler(event_type)),
            Entry::Vacant(slot) => {
                slot.insert(handler);
                Ok(())
            }
        }
    }

    /// Whether a handler is registered for `event_type`.
    #[must_use]
    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// Registered event types, sorted.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Routes `event` to the handler registered for its runtime type.
    ///
    /// # Errors
    ///
    /// Propagates the handler's error.
    #[instrument(skip_all, fields(event_type = event.event_type(), event_id = %event.id()))]
    pub async fn dispatch(
        &self,
        event: &dyn DomainEvent,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DomainError> {
        let Some(handler) = self.handlers.get(event.event_type()) else {
            warn!("no handler registered for event type; skipping");
            return Ok(DispatchOutcome::NoHandler);
        };
        handler.handle(event, cancel).await?;
        Ok(DispatchOutcome::Handled)
    }

    /// Dispatches `events` in order, stopping at the first handler error.
    ///
    /// # Errors
    ///
    /// Propagates the first handler error.
    pub async fn dispatch_all(
        &self,
        events: &[&dyn DomainEvent],
        cancel: &CancellationToken,
    ) -> Result<Vec<DispatchOutcome>, DomainError> {
        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            outcomes.push(self.dispatch(*event, cancel).await?);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tasklist_broker::InMemoryBroker;
    use tasklist_test_support::TestEvent;
    use uuid::Uuid;

    use crate::bus_publisher::BusPublisher;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(
            &self,
            event: &dyn DomainEvent,
            _cancel: &CancellationToken,
        ) -> Result<(), DomainError> {
            self.seen.lock().unwrap().push(event.id());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_event_type() {
        // Arrange
        let handler = Arc::new(RecordingHandler::default());
        let mut registry = EventHandlerRegistry::new();
        registry
            .register(TestEvent::EVENT_TYPE, handler.clone())
            .unwrap();
        let event = TestEvent::new("Tests");

        // Act
        let outcome = registry
            .dispatch(&event, &CancellationToken::new())
            .await
            .unwrap();

        // Assert
        assert_eq!(outcome, DispatchOutcome::Handled);
        assert_eq!(*handler.seen.lock().unwrap(), vec![event.id()]);
    }

    #[tokio::test]
    async fn test_dispatch_without_handler_is_skipped() {
        let registry = EventHandlerRegistry::new();

        let outcome = registry
            .dispatch(&TestEvent::new("Tests"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::NoHandler);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = EventHandlerRegistry::new();
        registry
            .register(TestEvent::EVENT_TYPE, Arc::new(RecordingHandler::default()))
            .unwrap();

        let result =
            registry.register(TestEvent::EVENT_TYPE, Arc::new(RecordingHandler::default()));

        assert!(matches!(
            result,
            Err(DomainError::DuplicateHandler(TestEvent::EVENT_TYPE))
        ));
        assert_eq!(registry.event_types(), vec![TestEvent::EVENT_TYPE]);
    }

    #[tokio::test]
    async fn test_forwarding_handler_publishes_to_broker() {
        // Arrange
        let broker = Arc::new(InMemoryBroker::default());
        let publisher = Arc::new(BusPublisher::new(broker.clone()));
        let mut registry = EventHandlerRegistry::new();
        registry
            .register(
                TestEvent::EVENT_TYPE,
                Arc::new(ForwardToPublisher::new(publisher)),
            )
            .unwrap();
        let first = TestEvent::new("Tests");
        let second = TestEvent::new("Tests");
        let events: [&dyn DomainEvent; 2] = [&first, &second];

        // Act
        let outcomes = registry
            .dispatch_all(&events, &CancellationToken::new())
            .await
            .unwrap();

        // Assert
        assert_eq!(outcomes, vec![DispatchOutcome::Handled; 2]);
        let ids: Vec<Uuid> = broker
            .messages_for("Tests")
            .iter()
            .map(|m| m.message_id)
            .collect();
        assert_eq!(ids, vec![first.id(), second.id()]);
    }
}
