//! Routes for the task-list bounded context.

use axum::extract::{Path, State};
use axum::{
    Json, Router,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use tasklist_todo::application::command_handlers::{self, CommandOutcome};
use tasklist_todo::application::query_handlers::{self, TodoItemView, TodoListView};
use tasklist_todo::domain::aggregates::PriorityLevel;
use tasklist_todo::domain::commands;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /lists.
#[derive(Debug, Deserialize)]
pub struct CreateListRequest {
    pub title: String,
    #[serde(default)]
    pub colour: Option<String>,
}

/// Request body for POST /lists/{list_id}/items.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub priority: PriorityLevel,
    #[serde(default)]
    pub reminder: Option<DateTime<Utc>>,
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// The list or item the command created or changed.
    pub id: Uuid,
    /// IDs of the outbox messages written with the change.
    pub outbox_message_ids: Vec<Uuid>,
}

impl From<CommandOutcome> for CommandResponse {
    fn from(outcome: CommandOutcome) -> Self {
        Self {
            id: outcome.aggregate_id,
            outbox_message_ids: outcome.outbox_message_ids,
        }
    }
}

/// POST /lists
#[instrument(skip(state, request))]
async fn create_list(
    State(state): State<AppState>,
    Json(request): Json<CreateListRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::CreateTodoList {
        correlation_id: Uuid::new_v4(),
        title: request.title,
        colour: request.colour,
    };

    info!(correlation_id = %command.correlation_id, "handling create_list command");

    let outcome = command_handlers::handle_create_todo_list(
        &command,
        state.unit_of_work.as_ref(),
        &state.request_token(),
    )
    .await?;

    Ok(Json(outcome.into()))
}

/// GET /lists/{list_id}
#[instrument(skip(state))]
async fn get_list(
    State(state): State<AppState>,
    Path(list_id): Path<Uuid>,
) -> Result<Json<TodoListView>, ApiError> {
    let view = query_handlers::get_list_by_id(list_id, state.aggregates.as_ref()).await?;
    Ok(Json(view))
}

/// POST /lists/{list_id}/items
#[instrument(skip(state, request))]
async fn add_item(
    State(state): State<AppState>,
    Path(list_id): Path<Uuid>,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::AddTodoItem {
        correlation_id: Uuid::new_v4(),
        list_id,
        title: request.title,
        note: request.note,
        priority: request.priority,
        reminder: request.reminder,
    };

    info!(correlation_id = %command.correlation_id, "handling add_item command");

    let outcome = command_handlers::handle_add_todo_item(
        &command,
        state.clock.as_ref(),
        state.aggregates.as_ref(),
        state.unit_of_work.as_ref(),
        &state.request_token(),
    )
    .await?;

    Ok(Json(outcome.into()))
}

/// GET /items/{item_id}
#[instrument(skip(state))]
async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<TodoItemView>, ApiError> {
    let view = query_handlers::get_item_by_id(item_id, state.aggregates.as_ref()).await?;
    Ok(Json(view))
}

/// POST /items/{item_id}/complete
#[instrument(skip(state))]
async fn complete_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::CompleteTodoItem {
        correlation_id: Uuid::new_v4(),
        item_id,
    };

    info!(correlation_id = %command.correlation_id, "handling complete_item command");

    let outcome = command_handlers::handle_complete_todo_item(
        &command,
        state.clock.as_ref(),
        state.aggregates.as_ref(),
        state.unit_of_work.as_ref(),
        &state.request_token(),
    )
    .await?;

    Ok(Json(outcome.into()))
}

/// POST /items/{item_id}/reopen
#[instrument(skip(state))]
async fn reopen_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::ReopenTodoItem {
        correlation_id: Uuid::new_v4(),
        item_id,
    };

    info!(correlation_id = %command.correlation_id, "handling reopen_item command");

    let outcome = command_handlers::handle_reopen_todo_item(
        &command,
        state.clock.as_ref(),
        state.aggregates.as_ref(),
        state.unit_of_work.as_ref(),
        &state.request_token(),
    )
    .await?;

    Ok(Json(outcome.into()))
}

/// Returns the router for the task-list context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lists", post(create_list))
        .route("/lists/{list_id}", get(get_list))
        .route("/lists/{list_id}/items", post(add_item))
        .route("/items/{item_id}", get(get_item))
        .route("/items/{item_id}/complete", post(complete_item))
        .route("/items/{item_id}/reopen", post(reopen_item))
}
