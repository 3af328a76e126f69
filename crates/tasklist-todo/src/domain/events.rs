//! Domain events for the task-list context.
//!
//! Each event carries its own copy of the item it is about, so the payload is a
//! plain tree: the list is referenced by id and never embedded.

use serde::{Deserialize, Serialize};
use tasklist_core::clock::Clock;
use tasklist_core::error::DomainError;
use tasklist_core::event::{DomainEvent, EventMetadata};

use super::aggregates::TodoItem;

/// Routing key for every item event.
pub const TODO_ITEM_TOPIC: &str = "TodoItem";

/// Emitted when an item is created through the create-item flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItemCreatedEvent {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub todo_item: TodoItem,
}

impl TodoItemCreatedEvent {
    pub const EVENT_TYPE: &'static str = "tasklist_todo::domain::events::TodoItemCreatedEvent";

    #[must_use]
    pub fn new(todo_item: TodoItem, clock: &dyn Clock) -> Self {
        Self {
            metadata: EventMetadata::new(TODO_ITEM_TOPIC, clock),
            todo_item,
        }
    }
}

/// Emitted when an item moves from not done to done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItemCompletedEvent {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub todo_item: TodoItem,
}

impl TodoItemCompletedEvent {
    pub const EVENT_TYPE: &'static str = "tasklist_todo::domain::events::TodoItemCompletedEvent";

    #[must_use]
    pub fn new(todo_item: TodoItem, clock: &dyn Clock) -> Self {
        Self {
            metadata: EventMetadata::new(TODO_ITEM_TOPIC, clock),
            todo_item,
        }
    }
}

/// Every event a `TodoItem` can queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoEvent {
    Created(TodoItemCreatedEvent),
    Completed(TodoItemCompletedEvent),
}

impl DomainEvent for TodoEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => TodoItemCreatedEvent::EVENT_TYPE,
            Self::Completed(_) => TodoItemCompletedEvent::EVENT_TYPE,
        }
    }

    fn metadata(&self) -> &EventMetadata {
        match self {
            Self::Created(event) => &event.metadata,
            Self::Completed(event) => &event.metadata,
        }
    }

    fn to_content(&self) -> Result<String, DomainError> {
        let content = match self {
            Self::Created(event) => serde_json::to_string(event)?,
            Self::Completed(event) => serde_json::to_string(event)?,
        };
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasklist_core::outbox::OutboxMessage;
    use tasklist_test_support::FixedClock;
    use uuid::Uuid;

    use crate::domain::aggregates::PriorityLevel;

    fn created() -> TodoItemCreatedEvent {
        let item = TodoItem::new(
            Uuid::new_v4(),
            "Water plants",
            Some("the ferns too".into()),
            PriorityLevel::High,
            None,
        )
        .unwrap();
        TodoItemCreatedEvent::new(item, &FixedClock::default())
    }

    #[test]
    fn test_content_is_camel_case_with_flattened_metadata() {
        let event = TodoEvent::Created(created());

        let json: serde_json::Value = serde_json::from_str(&event.to_content().unwrap()).unwrap();

        assert_eq!(json["id"], event.id().to_string());
        assert_eq!(json["topic"], TODO_ITEM_TOPIC);
        assert!(json.get("occurredOn").is_some());
        assert_eq!(json["todoItem"]["title"], "Water plants");
        assert_eq!(json["todoItem"]["priority"], "High");
        assert!(json.get("todo_item").is_none());
    }

    #[test]
    fn test_outbox_row_decodes_back_to_event() {
        let inner = created();
        let message = OutboxMessage::from_event(&TodoEvent::Created(inner.clone())).unwrap();

        let decoded: TodoItemCreatedEvent = message.decode().unwrap();

        assert_eq!(message.message_type, TodoItemCreatedEvent::EVENT_TYPE);
        assert_eq!(decoded, inner);
    }
}
