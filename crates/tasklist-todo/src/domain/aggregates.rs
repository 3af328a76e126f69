//! Aggregate roots for the task-list context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tasklist_core::aggregate::AggregateRoot;
use tasklist_core::clock::Clock;
use tasklist_core::error::DomainError;
use uuid::Uuid;

use super::events::{TodoEvent, TodoItemCompletedEvent, TodoItemCreatedEvent};

/// Maximum title length, in characters, for lists and items.
pub const TITLE_MAX_LEN: usize = 100;

/// How urgent an item is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
}

fn validate_title(title: &str) -> Result<String, DomainError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DomainError::Validation("title is required".into()));
    }
    if title.chars().count() > TITLE_MAX_LEN {
        return Err(DomainError::Validation(format!(
            "title must not exceed {TITLE_MAX_LEN} characters"
        )));
    }
    Ok(title.to_owned())
}

/// A named list of items. Lists raise no events of their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoList {
    pub id: Uuid,
    pub title: String,
    pub colour: Option<String>,
    /// Items in the order they were added. Items point back by id only.
    pub item_ids: Vec<Uuid>,
    #[serde(skip)]
    version: i64,
}

impl TodoList {
    /// Aggregate type name used as the persistence key.
    pub const AGGREGATE_TYPE: &'static str = "TodoList";

    /// Creates an empty list.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for an empty or over-long title.
    pub fn new(title: &str, colour: Option<String>) -> Result<Self, DomainError> {
        Ok(Self {
            id: Uuid::new_v4(),
            title: validate_title(title)?,
            colour,
            item_ids: Vec::new(),
            version: 0,
        })
    }

    /// Appends `item_id` unless the list already holds it.
    pub fn attach_item(&mut self, item_id: Uuid) {
        if !self.item_ids.contains(&item_id) {
            self.item_ids.push(item_id);
        }
    }
}

impl AggregateRoot for TodoList {
    type Event = TodoEvent;

    fn aggregate_type(&self) -> &'static str {
        Self::AGGREGATE_TYPE
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn snapshot(&self) -> Result<serde_json::Value, DomainError> {
        Ok(serde_json::to_value(self)?)
    }

    fn pending_events(&self) -> &[TodoEvent] {
        &[]
    }

    fn take_events(&mut self) -> Vec<TodoEvent> {
        Vec::new()
    }
}

/// A single task on a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    pub note: Option<String>,
    pub priority: PriorityLevel,
    pub reminder: Option<DateTime<Utc>>,
    pub done: bool,
    #[serde(skip)]
    version: i64,
    #[serde(skip)]
    pending_events: Vec<TodoEvent>,
}

impl TodoItem {
    /// Aggregate type name used as the persistence key.
    pub const AGGREGATE_TYPE: &'static str = "TodoItem";

    /// Builds an item without raising any event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for an empty or over-long title.
    pub fn new(
        list_id: Uuid,
        title: &str,
        note: Option<String>,
        priority: PriorityLevel,
        reminder: Option<DateTime<Utc>>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id: Uuid::new_v4(),
            list_id,
            title: validate_title(title)?,
            note,
            priority,
            reminder,
            done: false,
            version: 0,
            pending_events: Vec::new(),
        })
    }

    /// Builds an item and queues a `TodoItemCreatedEvent` for it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for an empty or over-long title.
    pub fn create(
        list_id: Uuid,
        title: &str,
        note: Option<String>,
        priority: PriorityLevel,
        reminder: Option<DateTime<Utc>>,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        let mut item = Self::new(list_id, title, note, priority, reminder)?;
        let event = TodoItemCreatedEvent::new(item.detached(), clock);
        item.pending_events.push(TodoEvent::Created(event));
        Ok(item)
    }

    /// Sets the done flag. Only a transition from not done to done queues a
    /// `TodoItemCompletedEvent`; reopening and repeated completion are silent.
    pub fn set_done(&mut self, done: bool, clock: &dyn Clock) {
        let completing = done && !self.done;
        self.done = done;
        if completing {
            let event = TodoItemCompletedEvent::new(self.detached(), clock);
            self.pending_events.push(TodoEvent::Completed(event));
        }
    }

    /// Copy of the item state without its event queue, as carried by events.
    fn detached(&self) -> Self {
        Self {
            id: self.id,
            list_id: self.list_id,
            title: self.title.clone(),
            note: self.note.clone(),
            priority: self.priority,
            reminder: self.reminder,
            done: self.done,
            version: self.version,
            pending_events: Vec::new(),
        }
    }
}

impl AggregateRoot for TodoItem {
    type Event = TodoEvent;

    fn aggregate_type(&self) -> &'static str {
        Self::AGGREGATE_TYPE
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn snapshot(&self) -> Result<serde_json::Value, DomainError> {
        Ok(serde_json::to_value(self)?)
    }

    fn pending_events(&self) -> &[TodoEvent] {
        &self.pending_events
    }

    fn take_events(&mut self) -> Vec<TodoEvent> {
        std::mem::take(&mut self.pending_events)
    }
}
