//! CRUD for `silver.rollup_configs` and `silver.dimension_configs`.
//! Lease mutation lives in `rollup-lease`; this module only covers reads,
//! inserts, and the plain progress/EWMA update applied after a successful
//! run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rollup_schemas::{DimensionConfig, LeaseStatus, RollupConfig};
use sqlx::{PgPool, Row};
use uuid::Uuid;

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

/// Parameters for creating a new `RollupConfig` row.
#[derive(Debug, Clone)]
pub struct NewRollupConfig {
    pub source_table: String,
    pub target_table: String,
    pub is_active: bool,
    pub rollup_interval_secs: i64,
    pub look_back_window_secs: i64,
    pub max_look_back_window_secs: i64,
    pub processing_window_secs: i64,
    pub chunk_interval_secs: i64,
    pub retention_period_secs: i64,
    pub max_execution_time_secs: i64,
    pub alert_threshold_secs: i64,
    /// Lease status the row is created with. Almost always `Idle`; a
    /// `Processing` row with no `worker_id`/`started_at` is rejected by the
    /// `ck_rollup_configs_lease_clean` check constraint, which is the
    /// correct outcome rather than something this layer should paper over.
    pub initial_status: LeaseStatus,
}

pub async fn insert_rollup_config(pool: &PgPool, new: &NewRollupConfig) -> Result<RollupConfig> {
    let row = sqlx::query(&format!(
        r#"
        insert into silver.rollup_configs (
            source_table, target_table, is_active, status,
            rollup_interval_secs, look_back_window_secs, max_look_back_window_secs,
            processing_window_secs, chunk_interval_secs, retention_period_secs,
            max_execution_time_secs, alert_threshold_secs
        ) values (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
        )
        returning {SELECT_COLUMNS}
        "#
    ))
    .bind(&new.source_table)
    .bind(&new.target_table)
    .bind(new.is_active)
    .bind(new.initial_status.as_str())
    .bind(new.rollup_interval_secs)
    .bind(new.look_back_window_secs)
    .bind(new.max_look_back_window_secs)
    .bind(new.processing_window_secs)
    .bind(new.chunk_interval_secs)
    .bind(new.retention_period_secs)
    .bind(new.max_execution_time_secs)
    .bind(new.alert_threshold_secs)
    .fetch_one(pool)
    .await
    .context("insert_rollup_config failed")?;

    row_to_config(&row)
}

pub async fn fetch_config(pool: &PgPool, id: Uuid) -> Result<RollupConfig> {
    let row = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from silver.rollup_configs where id = $1"
    ))
    .bind(id)
    .fetch_one(pool)
    .await
    .context("fetch_config failed")?;

    row_to_config(&row)
}

pub async fn fetch_config_by_source_target(
    pool: &PgPool,
    source_table: &str,
    target_table: &str,
) -> Result<Option<RollupConfig>> {
    let row = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from silver.rollup_configs where source_table = $1 and target_table = $2"
    ))
    .bind(source_table)
    .bind(target_table)
    .fetch_optional(pool)
    .await
    .context("fetch_config_by_source_target failed")?;

    row.as_ref().map(row_to_config).transpose()
}

pub async fn list_all_configs(pool: &PgPool) -> Result<Vec<RollupConfig>> {
    let rows = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from silver.rollup_configs order by source_table, target_table"
    ))
    .fetch_all(pool)
    .await
    .context("list_all_configs failed")?;

    rows.iter().map(row_to_config).collect()
}

/// Candidate set for a rollup sweep: active, optionally scoped to one source
/// table, and either idle or holding a stale lease. Ordered
/// `last_processed_time NULLS FIRST` so never-run configs are prioritised.
///
/// `alert_threshold_secs` is a per-row column, so the staleness predicate is
/// expressed with `make_interval` rather than a bound parameter.
pub async fn list_candidates(
    pool: &PgPool,
    specific_table: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<RollupConfig>> {
    let rows = sqlx::query(&format!(
        r#"
        select {SELECT_COLUMNS}
        from silver.rollup_configs
        where is_active = true
          and ($1::text is null or source_table = $1)
          and (
                status = 'idle'
                or (status = 'processing' and started_at < $2 - make_interval(secs => alert_threshold_secs::double precision))
              )
        order by last_processed_time nulls first
        "#
    ))
    .bind(specific_table)
    .bind(now)
    .fetch_all(pool)
    .await
    .context("list_candidates failed")?;

    rows.iter().map(row_to_config).collect()
}

/// Configs due for a retry sweep.
pub async fn list_due_retries(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<RollupConfig>> {
    let rows = sqlx::query(&format!(
        r#"
        select {SELECT_COLUMNS}
        from silver.rollup_configs
        where is_active = true
          and retry_count > 0
          and next_retry_time <= $1
        "#
    ))
    .bind(now)
    .fetch_all(pool)
    .await
    .context("list_due_retries failed")?;

    rows.iter().map(row_to_config).collect()
}

/// Apply the post-success progress update: advance `last_processed_time`,
/// reset retry fields, and record the latest processing window/EWMA/row
/// count. Does **not** touch the lease — call `rollup_lease::release`
/// separately.
#[allow(clippy::too_many_arguments)]
pub async fn apply_success(
    pool: &PgPool,
    id: Uuid,
    new_last_processed_time: DateTime<Utc>,
    new_processing_window_secs: i64,
    new_avg_processing_time_secs: f64,
    rows_processed: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        update silver.rollup_configs
        set last_processed_time = $2,
            processing_window_secs = $3,
            avg_processing_time_secs = $4,
            last_processed_rows = $5,
            retry_count = 0,
            last_error_time = null,
            next_retry_time = null
        where id = $1
        "#,
    )
    .bind(id)
    .bind(new_last_processed_time)
    .bind(new_processing_window_secs)
    .bind(new_avg_processing_time_secs)
    .bind(rows_processed)
    .execute(pool)
    .await
    .context("apply_success failed")?;

    Ok(())
}

/// Record a recomputed chunk interval after a maintenance pass.
pub async fn update_chunk_interval(
    pool: &PgPool,
    id: Uuid,
    chunk_interval_secs: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        update silver.rollup_configs
        set chunk_interval_secs = $2, last_optimization_time = $3
        where id = $1
        "#,
    )
    .bind(id)
    .bind(chunk_interval_secs)
    .bind(now)
    .execute(pool)
    .await
    .context("update_chunk_interval failed")?;

    Ok(())
}

/// Configs whose source or target table name matches a SQL `LIKE` pattern,
/// for the `GetDetailedStats(pattern)` operator read.
pub async fn list_configs_matching(pool: &PgPool, pattern: &str) -> Result<Vec<RollupConfig>> {
    let rows = sqlx::query(&format!(
        r#"
        select {SELECT_COLUMNS}
        from silver.rollup_configs
        where source_table like $1 or target_table like $1
        order by source_table, target_table
        "#
    ))
    .bind(pattern)
    .fetch_all(pool)
    .await
    .context("list_configs_matching failed")?;

    rows.iter().map(row_to_config).collect()
}

pub async fn insert_dimension_config(
    pool: &PgPool,
    source_table: &str,
    dimension_column: &str,
    is_active: bool,
) -> Result<DimensionConfig> {
    let row = sqlx::query(
        r#"
        insert into silver.dimension_configs (source_table, dimension_column, is_active)
        values ($1, $2, $3)
        on conflict (source_table, dimension_column) do update
            set is_active = excluded.is_active
        returning id, source_table, dimension_column, is_active
        "#,
    )
    .bind(source_table)
    .bind(dimension_column)
    .bind(is_active)
    .fetch_one(pool)
    .await
    .context("insert_dimension_config failed")?;

    Ok(DimensionConfig {
        id: row.try_get("id")?,
        source_table: row.try_get("source_table")?,
        dimension_column: row.try_get("dimension_column")?,
        is_active: row.try_get("is_active")?,
    })
}

/// Active dimensions declared for a source table, ordered by column name.
/// This ordering must stay stable: the plan builder and the bootstrap
/// primary key both rely on the same sort.
pub async fn list_active_dimensions(
    pool: &PgPool,
    source_table: &str,
) -> Result<Vec<DimensionConfig>> {
    let rows = sqlx::query(
        r#"
        select id, source_table, dimension_column, is_active
        from silver.dimension_configs
        where source_table = $1 and is_active = true
        order by dimension_column asc
        "#,
    )
    .bind(source_table)
    .fetch_all(pool)
    .await
    .context("list_active_dimensions failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(DimensionConfig {
            id: row.try_get("id")?,
            source_table: row.try_get("source_table")?,
            dimension_column: row.try_get("dimension_column")?,
            is_active: row.try_get("is_active")?,
        });
    }
    Ok(out)
}
