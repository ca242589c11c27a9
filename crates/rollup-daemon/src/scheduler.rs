//! Internal stand-ins for the external cron-like scheduler described in
//! spec §6: three named interval loops, each invoking one orchestrator
//! entry point. A panic or error inside a single tick is logged and never
//! kills the loop — the next tick runs regardless.
//!
//! These are spawned exactly once from `main`, so there is no
//! duplicate-registration hazard for the job names themselves; an
//! operator who wires `rollup-daemon` behind a *second* external
//! scheduler is responsible for not double-registering at that layer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rollup_orchestrator::{handle_retries, maintain_timeseries_tables, perform_rollup};
use tracing::{error, info, instrument};

use crate::state::AppState;

const JOB_PERFORM_ROLLUP: &str = "perform_rollup";
const JOB_HANDLE_RETRIES: &str = "handle_retries";
const JOB_MAINTAIN_TABLES: &str = "maintain_timeseries_tables";

/// Spawn all three scheduler loops. Each runs for the lifetime of the
/// process; callers don't need to hold onto the returned handles unless
/// they want to abort them (e.g. in a test harness).
pub fn spawn_all(state: Arc<AppState>, perform_rollup_every: Duration, handle_retries_every: Duration, maintain_tables_every: Duration) -> Vec<tokio::task::JoinHandle<()>> {
    vec![
        spawn_perform_rollup_loop(Arc::clone(&state), perform_rollup_every),
        spawn_handle_retries_loop(Arc::clone(&state), handle_retries_every),
        spawn_maintain_tables_loop(state, maintain_tables_every),
    ]
}

fn spawn_perform_rollup_loop(state: Arc<AppState>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            tick_perform_rollup(&state).await;
        }
    })
}

#[instrument(skip(state), name = "perform_rollup_tick")]
async fn tick_perform_rollup(state: &AppState) {
    match perform_rollup(&state.pool, &state.worker_id, None).await {
        Ok(report) => {
            info!(job = JOB_PERFORM_ROLLUP, claimed = report.claimed, processed_rows = report.processed_rows, failed = report.failed, "scheduler tick complete");
            state.ticks.write().await.last_perform_rollup = Some(Utc::now());
        }
        Err(err) => error!(job = JOB_PERFORM_ROLLUP, error = %err, "scheduler tick failed"),
    }
}

fn spawn_handle_retries_loop(state: Arc<AppState>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            tick_handle_retries(&state).await;
        }
    })
}

#[instrument(skip(state), name = "handle_retries_tick")]
async fn tick_handle_retries(state: &AppState) {
    match handle_retries(&state.pool, &state.worker_id).await {
        Ok(report) => {
            info!(job = JOB_HANDLE_RETRIES, claimed = report.claimed, failed = report.failed, "scheduler tick complete");
            state.ticks.write().await.last_handle_retries = Some(Utc::now());
        }
        Err(err) => error!(job = JOB_HANDLE_RETRIES, error = %err, "scheduler tick failed"),
    }
}

fn spawn_maintain_tables_loop(state: Arc<AppState>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            tick_maintain_tables(&state).await;
        }
    })
}

#[instrument(skip(state), name = "maintain_timeseries_tables_tick")]
async fn tick_maintain_tables(state: &AppState) {
    match maintain_timeseries_tables(&state.pool, state.partition_manager.as_ref(), None).await {
        Ok(updated) => {
            info!(job = JOB_MAINTAIN_TABLES, tables_updated = updated.len(), "scheduler tick complete");
            state.ticks.write().await.last_maintain_tables = Some(Utc::now());
        }
        Err(err) => error!(job = JOB_MAINTAIN_TABLES, error = %err, "scheduler tick failed"),
    }
}
