//! Optimistic lease claim and release, the sole points of mutual exclusion
//! for a `RollupConfig`. Both are single conditional `UPDATE ... RETURNING`
//! statements; the store is the linearisation point, no advisory locks.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rollup_schemas::{LeaseStatus, RollupConfig};
use sqlx::{PgPool, Row};
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    id, source_table, target_table, is_active,
    rollup_interval_secs, look_back_window_secs, max_look_back_window_secs,
    processing_window_secs, chunk_interval_secs, retention_period_secs,
    last_processed_time,
    status, worker_id, started_at,
    avg_processing_time_secs, last_processed_rows, last_optimization_time,
    retry_count, last_error_time, next_retry_time,
    max_execution_time_secs, alert_threshold_secs
"#;

fn row_to_config(row: &sqlx::postgres::PgRow) -> Result<RollupConfig> {
    Ok(RollupConfig {
        id: row.try_get("id")?,
        source_table: row.try_get("source_table")?,
        target_table: row.try_get("target_table")?,
        is_active: row.try_get("is_active")?,
        rollup_interval_secs: row.try_get("rollup_interval_secs")?,
        look_back_window_secs: row.try_get("look_back_window_secs")?,
        max_look_back_window_secs: row.try_get("max_look_back_window_secs")?,
        processing_window_secs: row.try_get("processing_window_secs")?,
        chunk_interval_secs: row.try_get("chunk_interval_secs")?,
        retention_period_secs: row.try_get("retention_period_secs")?,
        last_processed_time: row.try_get("last_processed_time")?,
        status: LeaseStatus::parse(&row.try_get::<String, _>("status")?)?,
        worker_id: row.try_get("worker_id")?,
        started_at: row.try_get("started_at")?,
        avg_processing_time_secs: row.try_get("avg_processing_time_secs")?,
        last_processed_rows: row.try_get("last_processed_rows")?,
        last_optimization_time: row.try_get("last_optimization_time")?,
        retry_count: row.try_get("retry_count")?,
        last_error_time: row.try_get("last_error_time")?,
        next_retry_time: row.try_get("next_retry_time")?,
        max_execution_time_secs: row.try_get("max_execution_time_secs")?,
        alert_threshold_secs: row.try_get("alert_threshold_secs")?,
    })
}

/// Attempt to claim `config_id` for `worker_id`. Succeeds when the config
/// is idle, or when it is `processing` but the lease is stale (started more
/// than `alert_threshold` ago, per the config's own column — the caller
/// does not need to know the threshold value up front since it is read
/// from the row itself inside the predicate).
///
/// Returns `None` when another worker holds a fresh lease; this is not an
/// error, the caller simply moves on to the next candidate.
pub async fn try_claim(pool: &PgPool, config_id: Uuid, worker_id: &str, now: DateTime<Utc>) -> Result<Option<RollupConfig>> {
    let row = sqlx::query(&format!(
        r#"
        update silver.rollup_configs
        set status = 'processing', worker_id = $2, started_at = $3
        where id = $1
          and (
                status = 'idle'
                or (status = 'processing' and started_at < $3 - make_interval(secs => alert_threshold_secs::double precision))
              )
        returning {SELECT_COLUMNS}
        "#
    ))
    .bind(config_id)
    .bind(worker_id)
    .bind(now)
    .fetch_optional(pool)
    .await
    .context("try_claim failed")?;

    row.as_ref().map(row_to_config).transpose()
}

/// Outcome of a release attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The release applied: this worker still held the lease.
    Released,
    /// Zero rows matched — the lease was revoked mid-run (takeover). The
    /// caller must not apply a progress update in this case.
    LeaseLost,
}

/// Release the lease back to `idle` after a successful run, also applying
/// the progress fields the orchestrator computed. Guarded by
/// `worker_id = :self` so a takeover always wins the race.
#[allow(clippy::too_many_arguments)]
pub async fn release_success(
    pool: &PgPool,
    config_id: Uuid,
    worker_id: &str,
    new_last_processed_time: DateTime<Utc>,
    new_processing_window_secs: i64,
    new_avg_processing_time_secs: f64,
    rows_processed: i64,
) -> Result<ReleaseOutcome> {
    let result = sqlx::query(
        r#"
        update silver.rollup_configs
        set status = 'idle',
            worker_id = null,
            started_at = null,
            last_processed_time = $3,
            processing_window_secs = $4,
            avg_processing_time_secs = $5,
            last_processed_rows = $6,
            retry_count = 0,
            last_error_time = null,
            next_retry_time = null
        where id = $1 and worker_id = $2
        "#,
    )
    .bind(config_id)
    .bind(worker_id)
    .bind(new_last_processed_time)
    .bind(new_processing_window_secs)
    .bind(new_avg_processing_time_secs)
    .bind(rows_processed)
    .execute(pool)
    .await
    .context("release_success failed")?;

    Ok(if result.rows_affected() == 1 {
        ReleaseOutcome::Released
    } else {
        ReleaseOutcome::LeaseLost
    })
}

/// Release the lease back to `idle` without touching progress fields, used
/// when the run produced no work (empty window) or was skipped outright.
pub async fn release_no_progress(pool: &PgPool, config_id: Uuid, worker_id: &str) -> Result<ReleaseOutcome> {
    let result = sqlx::query(
        r#"
        update silver.rollup_configs
        set status = 'idle', worker_id = null, started_at = null
        where id = $1 and worker_id = $2
        "#,
    )
    .bind(config_id)
    .bind(worker_id)
    .execute(pool)
    .await
    .context("release_no_progress failed")?;

    Ok(if result.rows_affected() == 1 {
        ReleaseOutcome::Released
    } else {
        ReleaseOutcome::LeaseLost
    })
}

/// Whether a claimed config's run has overrun its hard execution budget.
pub fn budget_exceeded(started_at: DateTime<Utc>, now: DateTime<Utc>, max_execution_time: Duration) -> bool {
    started_at < now - max_execution_time
}
