//! Append-only writers and readers for `silver.refresh_log` and
//! `silver.error_log`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rollup_schemas::{ErrorLogRow, RefreshLogRow};
use sqlx::{PgPool, Row};

pub async fn append_refresh_log(
    pool: &PgPool,
    table_name: &str,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    records_processed: i64,
) -> Result<RefreshLogRow> {
    let row = sqlx::query(
        r#"
        insert into silver.refresh_log (table_name, start_time, end_time, records_processed)
        values ($1, $2, $3, $4)
        returning id, table_name, start_time, end_time, records_processed, refresh_timestamp
        "#,
    )
    .bind(table_name)
    .bind(start_time)
    .bind(end_time)
    .bind(records_processed)
    .fetch_one(pool)
    .await
    .context("append_refresh_log failed")?;

    Ok(RefreshLogRow {
        id: row.try_get("id")?,
        table_name: row.try_get("table_name")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        records_processed: row.try_get("records_processed")?,
        refresh_timestamp: row.try_get("refresh_timestamp")?,
    })
}

#[allow(clippy::too_many_arguments)]
pub async fn append_error_log(
    pool: &PgPool,
    source_table: &str,
    target_table: &str,
    message: &str,
    sql_state: Option<&str>,
    detail: Option<&str>,
    hint: Option<&str>,
    context: Option<&str>,
    attempted_query: Option<&str>,
) -> Result<ErrorLogRow> {
    let row = sqlx::query(
        r#"
        insert into silver.error_log (
            source_table, target_table, message, sql_state, detail, hint, context, attempted_query
        ) values ($1, $2, $3, $4, $5, $6, $7, $8)
        returning id, source_table, target_table, error_timestamp,
                  message, sql_state, detail, hint, context, attempted_query
        "#,
    )
    .bind(source_table)
    .bind(target_table)
    .bind(message)
    .bind(sql_state)
    .bind(detail)
    .bind(hint)
    .bind(context)
    .bind(attempted_query)
    .fetch_one(pool)
    .await
    .context("append_error_log failed")?;

    Ok(ErrorLogRow {
        id: row.try_get("id")?,
        source_table: row.try_get("source_table")?,
        target_table: row.try_get("target_table")?,
        error_timestamp: row.try_get("error_timestamp")?,
        message: row.try_get("message")?,
        sql_state: row.try_get("sql_state")?,
        detail: row.try_get("detail")?,
        hint: row.try_get("hint")?,
        context: row.try_get("context")?,
        attempted_query: row.try_get("attempted_query")?,
    })
}

/// Most recent error recorded for a source/target pair, if any.
pub async fn latest_error_for(
    pool: &PgPool,
    source_table: &str,
    target_table: &str,
) -> Result<Option<ErrorLogRow>> {
    let row = sqlx::query(
        r#"
        select id, source_table, target_table, error_timestamp,
               message, sql_state, detail, hint, context, attempted_query
        from silver.error_log
        where source_table = $1 and target_table = $2
        order by error_timestamp desc
        limit 1
        "#,
    )
    .bind(source_table)
    .bind(target_table)
    .fetch_optional(pool)
    .await
    .context("latest_error_for failed")?;

    row.map(|row| {
        Ok(ErrorLogRow {
            id: row.try_get("id")?,
            source_table: row.try_get("source_table")?,
            target_table: row.try_get("target_table")?,
            error_timestamp: row.try_get("error_timestamp")?,
            message: row.try_get("message")?,
            sql_state: row.try_get("sql_state")?,
            detail: row.try_get("detail")?,
            hint: row.try_get("hint")?,
            context: row.try_get("context")?,
            attempted_query: row.try_get("attempted_query")?,
        })
    })
    .transpose()
}

/// Per-table refresh summary over a trailing window, used by the
/// operations monitor to derive health without scanning the whole log.
#[derive(Debug, Clone)]
pub struct RefreshSummary {
    pub table_name: String,
    pub run_count: i64,
    pub success_count: i64,
    pub total_rows_processed: i64,
    pub last_refresh: Option<DateTime<Utc>>,
    pub avg_duration_secs: f64,
}

pub async fn summarize_recent_refreshes(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<RefreshSummary>> {
    let rows = sqlx::query(
        r#"
        select
            table_name,
            count(*)::bigint as run_count,
            count(*) filter (where records_processed > 0)::bigint as success_count,
            coalesce(sum(records_processed), 0)::bigint as total_rows_processed,
            max(refresh_timestamp) as last_refresh,
            coalesce(avg(extract(epoch from (end_time - start_time))), 0.0) as avg_duration_secs
        from silver.refresh_log
        where refresh_timestamp >= $1
        group by table_name
        order by table_name
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .context("summarize_recent_refreshes failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(RefreshSummary {
            table_name: row.try_get("table_name")?,
            run_count: row.try_get("run_count")?,
            success_count: row.try_get("success_count")?,
            total_rows_processed: row.try_get("total_rows_processed")?,
            last_refresh: row.try_get("last_refresh")?,
            avg_duration_secs: row.try_get("avg_duration_secs")?,
        });
    }
    Ok(out)
}

/// Count of errors logged for a source/target pair since `since`, used to
/// decide whether a run has crossed into an alerting state.
pub async fn error_count_since(
    pool: &PgPool,
    source_table: &str,
    target_table: &str,
    since: DateTime<Utc>,
) -> Result<i64> {
    let row = sqlx::query(
        r#"
        select count(*)::bigint as n
        from silver.error_log
        where source_table = $1 and target_table = $2 and error_timestamp >= $3
        "#,
    )
    .bind(source_table)
    .bind(target_table)
    .bind(since)
    .fetch_one(pool)
    .await
    .context("error_count_since failed")?;

    row.try_get::<i64, _>("n").context("read error count")
}
