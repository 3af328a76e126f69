//! Handler registration for task-list events.

use std::sync::Arc;

use tasklist_core::error::DomainError;
use tasklist_outbox::{EventHandlerRegistry, EventPublisher, ForwardToPublisher};

use crate::domain::events::{TodoItemCompletedEvent, TodoItemCreatedEvent};

/// Registers a forwarding handler for every task-list event type.
///
/// # Errors
///
/// Returns `DomainError::DuplicateHandler` if either type is already registered.
pub fn register_todo_handlers(
    registry: &mut EventHandlerRegistry,
    publisher: &Arc<dyn EventPublisher>,
) -> Result<(), DomainError> {
    let forward = Arc::new(ForwardToPublisher::new(Arc::clone(publisher)));
    registry.register(TodoItemCreatedEvent::EVENT_TYPE, forward.clone())?;
    registry.register(TodoItemCompletedEvent::EVENT_TYPE, forward)?;
    Ok(())
}
