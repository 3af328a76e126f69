//! Query handlers for the task-list context.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tasklist_core::error::DomainError;
use tasklist_core::repository::AggregateStore;
use uuid::Uuid;

use crate::application::command_handlers::{load_item, load_list};
use crate::domain::aggregates::PriorityLevel;

/// Read-only view of a todo item.
#[derive(Debug, Serialize)]
pub struct TodoItemView {
    pub item_id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    pub note: Option<String>,
    pub priority: PriorityLevel,
    pub reminder: Option<DateTime<Utc>>,
    pub done: bool,
}

/// Read-only view of a todo list.
#[derive(Debug, Serialize)]
pub struct TodoListView {
    pub list_id: Uuid,
    pub title: String,
    pub colour: Option<String>,
    /// Item ids in the order they were added.
    pub item_ids: Vec<Uuid>,
}

/// Retrieves an item by id.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no item has the id.
pub async fn get_item_by_id(
    item_id: Uuid,
    store: &dyn AggregateStore,
) -> Result<TodoItemView, DomainError> {
    let item = load_item(store, item_id).await?;
    Ok(TodoItemView {
        item_id: item.id,
        list_id: item.list_id,
        title: item.title,
        note: item.note,
        priority: item.priority,
        reminder: item.reminder,
        done: item.done,
    })
}

/// Retrieves a list by id.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no list has the id.
pub async fn get_list_by_id(
    list_id: Uuid,
    store: &dyn AggregateStore,
) -> Result<TodoListView, DomainError> {
    let list = load_list(store, list_id).await?;
    Ok(TodoListView {
        list_id: list.id,
        title: list.title,
        colour: list.colour,
        item_ids: list.item_ids,
    })
}
