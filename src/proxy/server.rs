//! HTTP server setup and configuration.

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use super::client::EndpointClient;
use super::dispatch::Dispatcher;
use super::handlers;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::router::EndpointRegistry;
use crate::storage::{SqliteSink, TracingSink};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<Config>,
    pub db: Option<SqlitePool>,
}

/// Build the dispatcher described by `config`.
///
/// Outcomes always go to the log; they are also persisted when a pool is
/// given and `logging.log_requests` is on.
pub fn build_dispatcher(config: &Config, db: Option<&SqlitePool>) -> Result<Dispatcher> {
    let registry = Arc::new(EndpointRegistry::from_config(config)?);
    let client = EndpointClient::from_config(&config.client)
        .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

    let mut dispatcher = Dispatcher::new(registry, client, config.client.system_prompt.clone())
        .with_sink(Arc::new(TracingSink));

    if let Some(pool) = db {
        if config.logging.log_requests {
            dispatcher = dispatcher.with_sink(Arc::new(SqliteSink::new(pool.clone())));
        }
    }

    Ok(dispatcher)
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    let max_in_flight = state.config.server.max_concurrent_requests;

    Router::new()
        .route("/chat", post(handlers::chat))
        .route("/test_all", post(handlers::test_all))
        .route("/health", get(handlers::health))
        .route("/endpoints", get(handlers::list_endpoints))
        .route("/outcomes", get(handlers::list_outcomes))
        // State and middleware
        .with_state(state)
        .layer(ConcurrencyLimitLayer::new(max_in_flight))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until Ctrl-C.
pub async fn run_server(config: Config, db: Option<SqlitePool>) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();
    let dispatcher = build_dispatcher(&config, db.as_ref())?;

    tracing::info!(
        endpoints = dispatcher.registry().count(),
        persist_outcomes = db.is_some() && config.logging.log_requests,
        "Dispatcher ready"
    );

    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        config: Arc::new(config),
        db,
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting chatrelay server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
