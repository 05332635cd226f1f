//! Server mode: the conditional-request HTTP surface (spec §6.2).
//!
//! Wires the registry, the per-BRC scheduler, and the vendor provider map
//! into an Axum router, then serves it with graceful shutdown.

use anyhow::{Context, Result};
use icvsb_client::{LogMirror, Registry, RequestClient};
use icvsb_config::RuntimeConfig;
use icvsb_store::Store;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod error;
mod handlers;
mod init;
mod state;

pub use error::AppError;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use init::{init_providers, init_tracing};
use tower_http::trace::TraceLayer;

/// Graceful shutdown handler, mirroring the Ctrl+C / SIGTERM pattern used
/// by the scheduler's own cancellation token.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("received SIGTERM, starting graceful shutdown"),
    }
    shutdown.cancel();
}

/// Builds the router without binding a listener, so integration tests can
/// drive it in-process (spec §10.4).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::ready_check))
        .route("/benchmark", post(handlers::create_benchmark))
        .route("/benchmark/:id", get(handlers::get_benchmark))
        .route("/benchmark/:id/key", get(handlers::get_benchmark_key_redirect))
        .route("/benchmark/:id/log", get(handlers::get_benchmark_log))
        .route("/key/:id", get(handlers::get_key))
        .route("/labels", get(handlers::get_labels))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Entry point for server mode (spec §6.2, §9: "the HTTP handler inserts
/// the BRC into the registry synchronously before returning 201").
pub async fn run() -> Result<()> {
    let config = RuntimeConfig::load().context("failed to load configuration")?;

    let log_mirror = LogMirror::new();
    init_tracing(&config, log_mirror.clone());

    info!("icvsb server starting");

    let store = Store::open(&config.database.connection_url)
        .await
        .context("failed to open store")?;
    let providers = init_providers(&config);
    let client = Arc::new(RequestClient::new(store, providers));
    let registry = Arc::new(Registry::new());

    let shutdown = CancellationToken::new();
    let scheduler_handle = icvsb_client::scheduler::spawn_scheduler(registry.clone(), shutdown.clone());

    let state = AppState::new(
        registry,
        client,
        log_mirror,
        config.server.response_cache_capacity,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;

    info!("listening on http://{}", config.server.listen_addr);
    info!("  GET  /                      - landing page");
    info!("  GET  /health                - liveness check");
    info!("  GET  /ready                 - readiness check");
    info!("  POST /benchmark             - create a benchmarked request client");
    info!("  GET  /benchmark/:id         - introspect a benchmarked request client");
    info!("  GET  /benchmark/:id/key     - redirect to its current key");
    info!("  GET  /benchmark/:id/log     - its mirrored log");
    info!("  GET  /key/:id               - introspect a benchmark key");
    info!("  GET  /labels?uri=...        - conditional labeling");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("server error")?;

    shutdown.cancel();
    scheduler_handle.abort();
    info!("icvsb server shutdown complete");

    Ok(())
}
