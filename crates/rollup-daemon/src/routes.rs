//! Axum router and HTTP handlers for rollup-daemon.
//!
//! This is an operability surface over orchestrator *state* (configs,
//! health, a manual trigger) — not a query layer over rollup data, which
//! spec.md's Non-goals exclude. All handlers are `pub(crate)` so the
//! scenario tests in `tests/` can compose the router directly.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rollup_db::configs;
use rollup_orchestrator::{perform_rollup, snapshot};
use tracing::info;

use crate::{
    api_types::{ErrorResponse, HealthResponse, RunRollupRequest},
    state::AppState,
};

/// Build the complete application router wired to the given shared state.
/// Middleware (CORS, tracing) is attached by `main.rs`, not here, so tests
/// can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/rollup/run", post(run_rollup))
        .with_state(state)
}

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            uptime_secs: st.uptime_secs(),
        }),
    )
}

/// The C7 operations-monitor snapshot, as JSON: every config joined with
/// its latest error and a 24h refresh-log rollup.
pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> Response {
    let all_configs = match configs::list_all_configs(&st.pool).await {
        Ok(c) => c,
        Err(err) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { error: err.to_string() }),
            )
                .into_response()
        }
    };

    match snapshot(&st.pool, all_configs).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: err.to_string() }),
        )
            .into_response(),
    }
}

/// Manual trigger for an operator who doesn't want to wait for the next
/// scheduled tick. Scoped to one source table when the body names one; an
/// empty body (the common case) runs the full sweep.
pub(crate) async fn run_rollup(State(st): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: RunRollupRequest = if body.is_empty() {
        RunRollupRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(err) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse { error: format!("invalid request body: {err}") }),
                )
                    .into_response()
            }
        }
    };
    let source_table = request.source_table;
    info!(source_table = ?source_table, "manual rollup trigger");

    match perform_rollup(&st.pool, &st.worker_id, source_table.as_deref()).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: err.to_string() }),
        )
            .into_response(),
    }
}
