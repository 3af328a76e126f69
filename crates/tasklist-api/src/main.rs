//! Task-list API server entry point.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tasklist_api::config::{AppConfig, BrokerKind};
use tasklist_api::error::AppError;
use tasklist_api::services::{Adapters, assemble};
use tasklist_api::telemetry;
use tasklist_broker::{InMemoryBroker, LogBroker};
use tasklist_core::broker::MessageBroker;
use tasklist_core::clock::{Clock, SystemClock};
use tasklist_outbox_store::MIGRATOR;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    info!("Starting task-list API server");

    // Create database connection pool and bring the schema up to date.
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    MIGRATOR.run(&pool).await?;

    let broker: Arc<dyn MessageBroker> = match config.broker {
        BrokerKind::Memory => Arc::new(InMemoryBroker::new(config.batch_limits)),
        BrokerKind::Log => Arc::new(LogBroker::new(config.batch_limits)),
    };
    info!(
        broker = ?config.broker,
        max_batch_bytes = config.batch_limits.max_bytes,
        "broker selected"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let shutdown = CancellationToken::new();
    let services = assemble(
        Adapters::postgres(&pool, Arc::clone(&clock)),
        broker,
        clock,
        config.sweep,
        shutdown.clone(),
    )?;

    let tasks = TaskTracker::new();
    tasks.spawn(Arc::clone(&services.sweeper).run(shutdown.clone()));
    tasks.close();

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = tasklist_api::app(services.state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.socket_addr()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    tasks.wait().await;
    pool.close().await;
    info!("Server stopped");
    telemetry.shutdown();

    Ok(())
}

/// Resolves on Ctrl-C and cancels `shutdown` so background work stops too.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        shutdown.cancelled().await;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
