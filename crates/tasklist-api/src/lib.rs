//! HTTP surface and composition root for the task-list service.

pub mod config;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

use axum::Router;

use crate::state::AppState;

/// Builds the router with every route mounted. Middleware layers are added by
/// the binary.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::todo::router())
        .with_state(state)
}
