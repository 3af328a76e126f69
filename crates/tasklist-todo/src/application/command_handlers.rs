//! Command handlers for the task-list context.
//!
//! Each handler loads what it needs, applies the domain change and commits the
//! touched aggregates through a single unit of work, which also captures their
//! pending events into the outbox.

use serde::de::DeserializeOwned;
use tasklist_core::aggregate::AggregateRoot;
use tasklist_core::clock::Clock;
use tasklist_core::command::Command;
use tasklist_core::error::DomainError;
use tasklist_core::repository::{AggregateStore, CommitReceipt, UnitOfWork};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{TodoItem, TodoList};
use crate::domain::commands::{AddTodoItem, CompleteTodoItem, CreateTodoList, ReopenTodoItem};

/// What a successful command changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// The aggregate the command was about.
    pub aggregate_id: Uuid,
    /// Ids of the outbox rows written by the commit.
    pub outbox_message_ids: Vec<Uuid>,
}

impl CommandOutcome {
    fn from_receipt(aggregate_id: Uuid, receipt: &CommitReceipt) -> Self {
        Self {
            aggregate_id,
            outbox_message_ids: receipt.outbox_ids(),
        }
    }
}

async fn load<T: AggregateRoot + DeserializeOwned>(
    store: &dyn AggregateStore,
    aggregate_type: &'static str,
    id: Uuid,
) -> Result<T, DomainError> {
    let stored = store
        .load(aggregate_type, id)
        .await?
        .ok_or(DomainError::AggregateNotFound { aggregate_type, id })?;
    let mut aggregate: T = serde_json::from_value(stored.state).map_err(|e| {
        DomainError::Infrastructure(format!("aggregate deserialization failed: {e}"))
    })?;
    aggregate.set_version(stored.version);
    Ok(aggregate)
}

/// Loads a `TodoList` snapshot.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no list has the id.
pub(crate) async fn load_list(
    store: &dyn AggregateStore,
    list_id: Uuid,
) -> Result<TodoList, DomainError> {
    load(store, TodoList::AGGREGATE_TYPE, list_id).await
}

/// Loads a `TodoItem` snapshot. The loaded item has no pending events.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no item has the id.
pub(crate) async fn load_item(
    store: &dyn AggregateStore,
    item_id: Uuid,
) -> Result<TodoItem, DomainError> {
    load(store, TodoItem::AGGREGATE_TYPE, item_id).await
}

/// Handles the `CreateTodoList` command. Lists raise no events, so the
/// outcome carries no outbox ids.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a bad title, or the commit error.
#[instrument(
    skip_all,
    fields(command = command.command_type(), correlation_id = %command.correlation_id())
)]
pub async fn handle_create_todo_list(
    command: &CreateTodoList,
    uow: &dyn UnitOfWork,
    cancel: &CancellationToken,
) -> Result<CommandOutcome, DomainError> {
    let mut list = TodoList::new(&command.title, command.colour.clone())?;
    let receipt = uow.commit(&mut [&mut list], cancel).await?;
    info!(list_id = %list.id, "todo list created");
    Ok(CommandOutcome::from_receipt(list.id, &receipt))
}

/// Handles the `AddTodoItem` command: creates the item, attaches it to its list
/// and commits both together with the item's created event.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the list does not exist,
/// `DomainError::Validation` for a bad title, or the commit error.
#[instrument(
    skip_all,
    fields(command = command.command_type(), correlation_id = %command.correlation_id())
)]
pub async fn handle_add_todo_item(
    command: &AddTodoItem,
    clock: &dyn Clock,
    store: &dyn AggregateStore,
    uow: &dyn UnitOfWork,
    cancel: &CancellationToken,
) -> Result<CommandOutcome, DomainError> {
    let mut list = load_list(store, command.list_id).await?;
    let mut item = TodoItem::create(
        list.id,
        &command.title,
        command.note.clone(),
        command.priority,
        command.reminder,
        clock,
    )?;
    list.attach_item(item.id);

    let receipt = uow.commit(&mut [&mut list, &mut item], cancel).await?;
    info!(list_id = %list.id, item_id = %item.id, "todo item added");
    Ok(CommandOutcome::from_receipt(item.id, &receipt))
}

/// Handles the `CompleteTodoItem` command. Completing an item that is already
/// done commits no event.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the item does not exist, or the
/// commit error.
#[instrument(
    skip_all,
    fields(command = command.command_type(), correlation_id = %command.correlation_id())
)]
pub async fn handle_complete_todo_item(
    command: &CompleteTodoItem,
    clock: &dyn Clock,
    store: &dyn AggregateStore,
    uow: &dyn UnitOfWork,
    cancel: &CancellationToken,
) -> Result<CommandOutcome, DomainError> {
    set_done(command.item_id, true, clock, store, uow, cancel).await
}

/// Handles the `ReopenTodoItem` command. Reopening never raises an event.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the item does not exist, or the
/// commit error.
#[instrument(
    skip_all,
    fields(command = command.command_type(), correlation_id = %command.correlation_id())
)]
pub async fn handle_reopen_todo_item(
    command: &ReopenTodoItem,
    clock: &dyn Clock,
    store: &dyn AggregateStore,
    uow: &dyn UnitOfWork,
    cancel: &CancellationToken,
) -> Result<CommandOutcome, DomainError> {
    set_done(command.item_id, false, clock, store, uow, cancel).await
}

async fn set_done(
    item_id: Uuid,
    done: bool,
    clock: &dyn Clock,
    store: &dyn AggregateStore,
    uow: &dyn UnitOfWork,
    cancel: &CancellationToken,
) -> Result<CommandOutcome, DomainError> {
    let mut item = load_item(store, item_id).await?;
    item.set_done(done, clock);
    let receipt = uow.commit(&mut [&mut item], cancel).await?;
    info!(item_id = %item.id, done, "todo item updated");
    Ok(CommandOutcome::from_receipt(item.id, &receipt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tasklist_core::outbox::OutboxMessage;
    use tasklist_core::repository::StoredAggregate;
    use tasklist_test_support::{FixedClock, InMemoryOutbox};
    use tokio::sync::Barrier;

    use crate::domain::aggregates::PriorityLevel;
    use crate::domain::events::{TodoItemCompletedEvent, TodoItemCreatedEvent};

    async fn create_list(outbox: &InMemoryOutbox) -> Uuid {
        let command = CreateTodoList {
            correlation_id: Uuid::new_v4(),
            title: "Groceries".into(),
            colour: None,
        };
        handle_create_todo_list(&command, outbox, &CancellationToken::new())
            .await
            .unwrap()
            .aggregate_id
    }

    async fn add_item(outbox: &InMemoryOutbox, list_id: Uuid) -> CommandOutcome {
        let command = AddTodoItem {
            correlation_id: Uuid::new_v4(),
            list_id,
            title: "Buy milk".into(),
            note: None,
            priority: PriorityLevel::Medium,
            reminder: None,
        };
        handle_add_todo_item(
            &command,
            &FixedClock::default(),
            outbox,
            outbox,
            &CancellationToken::new(),
        )
        .await
        .unwrap()
    }

    /// Holds every load until `barrier` has seen all callers, so concurrent
    /// handlers all read the same snapshot before any of them commits.
    struct LockstepStore {
        inner: Arc<InMemoryOutbox>,
        barrier: Barrier,
    }

    #[async_trait]
    impl AggregateStore for LockstepStore {
        async fn load(
            &self,
            aggregate_type: &str,
            aggregate_id: Uuid,
        ) -> Result<Option<StoredAggregate>, DomainError> {
            let loaded = self.inner.load(aggregate_type, aggregate_id).await;
            self.barrier.wait().await;
            loaded
        }
    }

    fn add_command(list_id: Uuid, title: &str) -> AddTodoItem {
        AddTodoItem {
            correlation_id: Uuid::new_v4(),
            list_id,
            title: title.into(),
            note: None,
            priority: PriorityLevel::None,
            reminder: None,
        }
    }

    fn complete(item_id: Uuid) -> CompleteTodoItem {
        CompleteTodoItem {
            correlation_id: Uuid::new_v4(),
            item_id,
        }
    }

    #[tokio::test]
    async fn test_create_list_writes_no_outbox_rows() {
        let outbox = InMemoryOutbox::new();

        let list_id = create_list(&outbox).await;

        assert!(outbox.messages().is_empty());
        let list = load_list(&outbox, list_id).await.unwrap();
        assert_eq!(list.title, "Groceries");
    }

    #[tokio::test]
    async fn test_add_item_commits_list_item_and_created_event() {
        // Arrange
        let outbox = InMemoryOutbox::new();
        let list_id = create_list(&outbox).await;

        // Act
        let outcome = add_item(&outbox, list_id).await;

        // Assert
        assert_eq!(outcome.outbox_message_ids.len(), 1);
        let messages = outbox.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_type, TodoItemCreatedEvent::EVENT_TYPE);
        assert_eq!(messages[0].topic, "TodoItem");
        let event: TodoItemCreatedEvent = messages[0].decode().unwrap();
        assert_eq!(event.todo_item.id, outcome.aggregate_id);
        assert_eq!(event.todo_item.list_id, list_id);

        let list = load_list(&outbox, list_id).await.unwrap();
        assert_eq!(list.item_ids, vec![outcome.aggregate_id]);
    }

    #[tokio::test]
    async fn test_concurrent_adds_to_one_list_conflict_instead_of_losing_an_item() {
        // Arrange
        let outbox = Arc::new(InMemoryOutbox::new());
        let list_id = create_list(&outbox).await;
        let store = LockstepStore {
            inner: Arc::clone(&outbox),
            barrier: Barrier::new(2),
        };
        let clock = FixedClock::default();
        let cancel = CancellationToken::new();
        let milk = add_command(list_id, "Buy milk");
        let bread = add_command(list_id, "Buy bread");

        // Act
        let (first, second) = tokio::join!(
            handle_add_todo_item(&milk, &clock, &store, outbox.as_ref(), &cancel),
            handle_add_todo_item(&bread, &clock, &store, outbox.as_ref(), &cancel),
        );

        // Assert
        let (added, conflict) = match (first, second) {
            (Ok(added), Err(conflict)) | (Err(conflict), Ok(added)) => (added, conflict),
            other => panic!("expected one success and one conflict, got {other:?}"),
        };
        match conflict {
            DomainError::ConcurrencyConflict {
                aggregate_type,
                aggregate_id,
                expected,
            } => {
                assert_eq!(aggregate_type, TodoList::AGGREGATE_TYPE);
                assert_eq!(aggregate_id, list_id);
                assert_eq!(expected, 1);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        let list = load_list(outbox.as_ref(), list_id).await.unwrap();
        assert_eq!(list.item_ids, vec![added.aggregate_id]);
        assert_eq!(outbox.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_sequential_adds_keep_every_item() {
        let outbox = InMemoryOutbox::new();
        let list_id = create_list(&outbox).await;

        let first = add_item(&outbox, list_id).await.aggregate_id;
        let second = add_item(&outbox, list_id).await.aggregate_id;

        let list = load_list(&outbox, list_id).await.unwrap();
        assert_eq!(list.item_ids, vec![first, second]);
        assert_eq!(list.version(), 3);
    }

    #[tokio::test]
    async fn test_add_item_to_missing_list_is_not_found() {
        let outbox = InMemoryOutbox::new();
        let missing = Uuid::new_v4();
        let command = AddTodoItem {
            correlation_id: Uuid::new_v4(),
            list_id: missing,
            title: "Buy milk".into(),
            note: None,
            priority: PriorityLevel::None,
            reminder: None,
        };

        let result = handle_add_todo_item(
            &command,
            &FixedClock::default(),
            &outbox,
            &outbox,
            &CancellationToken::new(),
        )
        .await;

        match result {
            Err(DomainError::AggregateNotFound { aggregate_type, id }) => {
                assert_eq!(aggregate_type, "TodoList");
                assert_eq!(id, missing);
            }
            other => panic!("expected AggregateNotFound, got {other:?}"),
        }
        assert!(outbox.messages().is_empty());
    }

    #[tokio::test]
    async fn test_complete_twice_writes_one_completed_event() {
        // Arrange
        let outbox = InMemoryOutbox::new();
        let list_id = create_list(&outbox).await;
        let item_id = add_item(&outbox, list_id).await.aggregate_id;
        let clock = FixedClock::default();
        let cancel = CancellationToken::new();

        // Act
        let first = handle_complete_todo_item(&complete(item_id), &clock, &outbox, &outbox, &cancel)
            .await
            .unwrap();
        let second =
            handle_complete_todo_item(&complete(item_id), &clock, &outbox, &outbox, &cancel)
                .await
                .unwrap();

        // Assert
        assert_eq!(first.outbox_message_ids.len(), 1);
        assert!(second.outbox_message_ids.is_empty());
        let completed: Vec<OutboxMessage> = outbox
            .messages()
            .into_iter()
            .filter(|m| m.message_type == TodoItemCompletedEvent::EVENT_TYPE)
            .collect();
        assert_eq!(completed.len(), 1);
        let event: TodoItemCompletedEvent = completed[0].decode().unwrap();
        assert!(event.todo_item.done);
        assert!(load_item(&outbox, item_id).await.unwrap().done);
    }

    #[tokio::test]
    async fn test_reopen_then_complete_raises_a_new_event() {
        let outbox = InMemoryOutbox::new();
        let list_id = create_list(&outbox).await;
        let item_id = add_item(&outbox, list_id).await.aggregate_id;
        let clock = FixedClock::default();
        let cancel = CancellationToken::new();
        handle_complete_todo_item(&complete(item_id), &clock, &outbox, &outbox, &cancel)
            .await
            .unwrap();

        let reopened = handle_reopen_todo_item(
            &ReopenTodoItem {
                correlation_id: Uuid::new_v4(),
                item_id,
            },
            &clock,
            &outbox,
            &outbox,
            &cancel,
        )
        .await
        .unwrap();
        let again = handle_complete_todo_item(&complete(item_id), &clock, &outbox, &outbox, &cancel)
            .await
            .unwrap();

        assert!(reopened.outbox_message_ids.is_empty());
        assert_eq!(again.outbox_message_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_rows() {
        let outbox = InMemoryOutbox::new();
        let list_id = create_list(&outbox).await;
        outbox.fail_next_commit();
        let command = AddTodoItem {
            correlation_id: Uuid::new_v4(),
            list_id,
            title: "Buy milk".into(),
            note: None,
            priority: PriorityLevel::None,
            reminder: None,
        };

        let result = handle_add_todo_item(
            &command,
            &FixedClock::default(),
            &outbox,
            &outbox,
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
        assert!(outbox.messages().is_empty());
        assert!(load_list(&outbox, list_id).await.unwrap().item_ids.is_empty());
    }

    #[tokio::test]
    async fn test_blank_title_is_rejected_before_commit() {
        let outbox = InMemoryOutbox::new();
        let command = CreateTodoList {
            correlation_id: Uuid::new_v4(),
            title: "  ".into(),
            colour: None,
        };

        let result = handle_create_todo_list(&command, &outbox, &CancellationToken::new()).await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(outbox.aggregate_count(), 0);
    }
}
