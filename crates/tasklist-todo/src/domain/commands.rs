//! Commands for the task-list context.

use chrono::{DateTime, Utc};
use tasklist_core::command::Command;
use uuid::Uuid;

use super::aggregates::PriorityLevel;

/// Command to create an empty list.
#[derive(Debug, Clone)]
pub struct CreateTodoList {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    pub title: String,
    pub colour: Option<String>,
}

/// Command to create an item and add it to an existing list.
#[derive(Debug, Clone)]
pub struct AddTodoItem {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The list the item joins. Must exist.
    pub list_id: Uuid,
    pub title: String,
    pub note: Option<String>,
    pub priority: PriorityLevel,
    pub reminder: Option<DateTime<Utc>>,
}

/// Command to mark an item done.
#[derive(Debug, Clone)]
pub struct CompleteTodoItem {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    pub item_id: Uuid,
}

/// Command to mark an item not done.
#[derive(Debug, Clone)]
pub struct ReopenTodoItem {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    pub item_id: Uuid,
}

impl Command for CreateTodoList {
    fn command_type(&self) -> &'static str {
        "todo.create_list"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl Command for AddTodoItem {
    fn command_type(&self) -> &'static str {
        "todo.add_item"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl Command for CompleteTodoItem {
    fn command_type(&self) -> &'static str {
        "todo.complete_item"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl Command for ReopenTodoItem {
    fn command_type(&self) -> &'static str {
        "todo.reopen_item"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
