//! rollup-daemon entry point.
//!
//! Thin by design: sets up tracing, connects the pool, runs migrations,
//! spawns the three scheduler loops that stand in for an external cron
//! trigger (spec §6), and serves the operator HTTP surface. All route
//! handlers live in `routes.rs`; shared state lives in `state.rs`.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use rollup_config::Settings;
use rollup_daemon::{routes, scheduler, state};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let settings = Settings::from_env().context("loading settings")?;

    let pool = rollup_db::connect_from_env()
        .await
        .context("connecting to Postgres")?;
    rollup_db::migrate(&pool).await.context("running migrations")?;

    let shared = state::AppState::new(pool, settings.worker_id.clone());

    let _scheduler_handles = scheduler::spawn_all(
        Arc::clone(&shared),
        settings.perform_rollup_interval,
        settings.handle_retries_interval,
        settings.maintain_tables_interval,
    );

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    info!(addr = %settings.http_bind_addr, worker_id = %settings.worker_id, "rollup-daemon listening");

    axum::serve(tokio::net::TcpListener::bind(settings.http_bind_addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// CORS: allow only localhost origins, matching the teacher daemon's
/// posture for an operator-facing control surface.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
