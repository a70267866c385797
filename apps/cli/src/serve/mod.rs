//! `meshctx serve`: HTTP JSON API over the collection and prompt pipelines.
//!
//! Endpoints:
//! - GET  /health   - Service status, connector and store names, snapshot count
//! - POST /collect  - Collect the current topology and store a snapshot
//! - GET  /prompt   - Context definitions built from the latest snapshot
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod state;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use color_eyre::eyre::{Result, WrapErr};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use meshctx_core::TopologyConnector;
use meshctx_shared::AppConfig;
use meshctx_storage::TopologyStore;

use self::handlers::{handle_collect, handle_health, handle_not_found, handle_prompt};
pub(crate) use self::state::AppState;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (
        status,
        Json(serde_json::json!({"status": "error", "message": message})),
    )
}

/// Build the application router.
pub(crate) fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/collect", post(handle_collect))
        .route("/prompt", get(handle_prompt))
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl+C.
pub(crate) async fn start_server(
    config: AppConfig,
    connector: Arc<dyn TopologyConnector>,
    store: Arc<dyn TopologyStore>,
    bind: &str,
    port: u16,
) -> Result<()> {
    let state = Arc::new(AppState {
        config: Arc::new(config),
        connector,
        store,
    });
    let app = router(state.clone());

    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;

    info!(
        %addr,
        connector = state.connector.name(),
        store = state.store.name(),
        workloads = state.config.topology.workloads.len(),
        "meshctx listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("server error")?;

    info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => error!(error = %e, "failed to install Ctrl+C handler"),
    }
}
