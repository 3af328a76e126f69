//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tasklist_api::services::{Adapters, assemble};
use tasklist_broker::InMemoryBroker;
use tasklist_core::clock::Clock;
use tasklist_outbox::SweepConfig;
use tasklist_test_support::FixedClock;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Build the full app router over Postgres with an in-memory broker and a
/// fixed clock. Uses the same wiring as `main.rs`.
pub fn build_test_app(pool: PgPool, broker: &InMemoryBroker) -> Router {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::default());
    let services = assemble(
        Adapters::postgres(&pool, Arc::clone(&clock)),
        Arc::new(broker.clone()),
        clock,
        SweepConfig::default(),
        CancellationToken::new(),
    )
    .unwrap();
    tasklist_api::app(services.state)
}

/// Send a POST request with an optional JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: Option<&serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method("POST").uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
