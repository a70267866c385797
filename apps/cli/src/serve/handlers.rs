//! HTTP route handlers: health, collect, prompt.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{error, warn};

use meshctx_core::{CollectOutcome, CollectParams, SilentProgress, build_prompt, collect_topology};
use meshctx_shared::{AdjacencyList, MeshCtxError};

use super::json_error;
use super::state::AppState;

/// Body of a successful `POST /collect`.
#[derive(Debug, Serialize)]
pub(crate) struct CollectResponse {
    status: &'static str,
    message: String,
    adjacency_list: AdjacencyList,
    snapshot_id: String,
    timestamp: String,
    connector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_window_minutes: Option<u32>,
}

impl From<CollectOutcome> for CollectResponse {
    fn from(outcome: CollectOutcome) -> Self {
        let rfc3339 = |ts: chrono::DateTime<Utc>| ts.to_rfc3339_opts(SecondsFormat::Secs, true);
        Self {
            status: "success",
            message: format!(
                "collected {} edges from {} source workloads",
                outcome.adjacency_list.edge_count(),
                outcome.adjacency_list.source_count()
            ),
            snapshot_id: outcome.snapshot_id.to_string(),
            timestamp: rfc3339(outcome.collected_at),
            connector: outcome.connector,
            from_timestamp: outcome.window.map(|w| rfc3339(w.from())),
            to_timestamp: outcome.window.map(|w| rfc3339(w.to())),
            time_window_minutes: outcome.time_window_minutes,
            adjacency_list: outcome.adjacency_list,
        }
    }
}

/// Map a pipeline error onto a status code and the error body.
fn error_response(err: &MeshCtxError) -> Response {
    if err.is_client_error() {
        warn!(error = %err, "rejected request");
        json_error(StatusCode::BAD_REQUEST, &err.to_string()).into_response()
    } else {
        error!(error = %err, "request failed");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()).into_response()
    }
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
///
/// 503 when the snapshot store cannot be queried.
pub(crate) async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    match state.store.snapshot_count().await {
        Ok(snapshots) => {
            let response = serde_json::json!({
                "status": "healthy",
                "connector": state.connector.name(),
                "store": state.store.name(),
                "snapshots": snapshots,
                "timestamp": timestamp,
            });
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            error!(error = %e, "store health check failed");
            let response = serde_json::json!({
                "status": "unhealthy",
                "connector": state.connector.name(),
                "store": state.store.name(),
                "message": e.to_string(),
                "timestamp": timestamp,
            });
            (StatusCode::SERVICE_UNAVAILABLE, Json(response)).into_response()
        }
    }
}

/// POST /collect?from_timestamp=..&to_timestamp=..
pub(crate) async fn handle_collect(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CollectParams>,
) -> Response {
    let result = collect_topology(
        state.connector.as_ref(),
        state.store.as_ref(),
        &state.config.topology,
        &params,
        &SilentProgress,
    )
    .await;

    match result {
        Ok(outcome) => (StatusCode::OK, Json(CollectResponse::from(outcome))).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /prompt
pub(crate) async fn handle_prompt(State(state): State<Arc<AppState>>) -> Response {
    match build_prompt(state.store.as_ref(), &state.config).await {
        Ok(document) => (StatusCode::OK, Json(document)).into_response(),
        Err(e) => error_response(&e),
    }
}
