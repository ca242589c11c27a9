//! Target-table creation, chunk-interval maintenance, and config
//! validation: the one-time and periodic housekeeping that keeps a rollup
//! config's target table shaped correctly and partitioned sensibly.

use anyhow::{Context, Result};
use chrono::Duration;
use rollup_db::configs::{self, NewRollupConfig};
use rollup_db::{inspector, SchemaCache};
use rollup_plan::{classify_source, quote_ident, quote_qualified};
use rollup_schemas::{ColumnInfo, LeaseStatus, SemanticType};
use serde::Serialize;
use sqlx::PgPool;

use crate::partitions::PartitionManager;

/// Arguments to create a new rollup target table and its config row.
pub struct CreateRollupTableArgs {
    pub source_table: String,
    pub target_schema: String,
    pub target_name: String,
    pub rollup_interval_secs: i64,
    pub look_back_window_secs: i64,
    pub retention_period_secs: i64,
    pub processing_window_secs: i64,
    pub is_active: bool,
    /// Lease status the config row is created with. Must be `Idle`: a
    /// freshly bootstrapped config has no worker holding its lease, and
    /// `ck_rollup_configs_lease_clean` rejects `Processing` without one.
    pub initial_status: LeaseStatus,
}

/// Create `target`, its indexes, and the matching `RollupConfig` row.
pub async fn create_rollup_table(
    pool: &PgPool,
    partition_manager: &dyn PartitionManager,
    args: CreateRollupTableArgs,
) -> Result<()> {
    anyhow::ensure!(
        args.initial_status == LeaseStatus::Idle,
        "initial_status must be idle: a newly created config has no worker holding its lease"
    );

    let target_table = format!("{}.{}", args.target_schema, args.target_name);

    let source_columns = inspector::introspect_columns(pool, &args.source_table).await?;
    let dimensions = configs::list_active_dimensions(pool, &args.source_table).await?;
    let (classification, _missing) = classify_source(&source_columns, &dimensions);

    let column_by_name: std::collections::HashMap<&str, &ColumnInfo> =
        source_columns.iter().map(|c| (c.name.as_str(), c)).collect();

    let ddl = render_create_table(&target_table, &classification, &column_by_name);
    sqlx::query(&ddl)
        .execute(pool)
        .await
        .with_context(|| format!("failed to create rollup target table {target_table}"))?;

    for idx in render_indexes(&target_table, &classification, &column_by_name) {
        sqlx::query(&idx)
            .execute(pool)
            .await
            .with_context(|| format!("failed to create index on {target_table}"))?;
    }

    let chunk_interval = optimize_chunk_interval(None, None, None);
    partition_manager
        .create_parent(
            &target_table,
            "timestamp",
            chunk_interval,
            4,
        )
        .await?;
    partition_manager
        .set_retention(&target_table, Duration::seconds(args.retention_period_secs), false, true)
        .await?;

    configs::insert_rollup_config(
        pool,
        &NewRollupConfig {
            source_table: args.source_table,
            target_table,
            is_active: args.is_active,
            rollup_interval_secs: args.rollup_interval_secs,
            look_back_window_secs: args.look_back_window_secs,
            max_look_back_window_secs: args.look_back_window_secs.max(args.processing_window_secs) * 4,
            processing_window_secs: args.processing_window_secs,
            chunk_interval_secs: chunk_interval.num_seconds(),
            retention_period_secs: args.retention_period_secs,
            max_execution_time_secs: 600,
            alert_threshold_secs: 300,
            initial_status: args.initial_status,
        },
    )
    .await?;

    Ok(())
}

fn render_create_table(
    target_table: &str,
    classification: &rollup_plan::SourceClassification,
    column_by_name: &std::collections::HashMap<&str, &ColumnInfo>,
) -> String {
    let mut columns = vec![format!("{} timestamp not null", quote_ident("timestamp"))];

    for dim in &classification.dimensions {
        let pg_type = column_by_name.get(dim.as_str()).map(|c| c.pg_type.as_str()).unwrap_or("text");
        columns.push(format!("{} {} not null", quote_ident(dim), pg_type));
    }

    for numeric in &classification.numeric {
        let pg_type = numeric.pg_type.as_str();
        columns.push(format!("{} {}", quote_ident(&format!("min_{}", numeric.name)), pg_type));
        columns.push(format!("{} {}", quote_ident(&format!("max_{}", numeric.name)), pg_type));
        columns.push(format!("{} double precision", quote_ident(&format!("avg_{}", numeric.name))));
    }

    for nonnumeric in &classification.nonnumeric {
        let column_sql = match nonnumeric.semantic_type {
            SemanticType::Json => format!("{} jsonb[]", quote_ident(&nonnumeric.name)),
            _ => format!("{} {}", quote_ident(&nonnumeric.name), nonnumeric.pg_type),
        };
        columns.push(column_sql);
    }

    columns.push(format!("{} integer not null default 1", quote_ident("rollup_count")));
    columns.push(format!("{} timestamp not null default now()", quote_ident("last_updated_at")));

    let pk_cols: Vec<String> = std::iter::once(quote_ident("timestamp"))
        .chain(classification.dimensions.iter().map(|d| quote_ident(d)))
        .collect();
    columns.push(format!("primary key ({})", pk_cols.join(", ")));

    format!(
        "create table if not exists {target} ({cols}) partition by range ({ts})",
        target = quote_qualified(target_table),
        cols = columns.join(",\n    "),
        ts = quote_ident("timestamp"),
    )
}

fn render_indexes(
    target_table: &str,
    classification: &rollup_plan::SourceClassification,
    _column_by_name: &std::collections::HashMap<&str, &ColumnInfo>,
) -> Vec<String> {
    let target = quote_qualified(target_table);
    let table_ident = target_table.replace(['.', '"'], "_");
    let mut statements = vec![format!(
        "create index if not exists idx_{table_ident}_timestamp on {target} using brin ({})",
        quote_ident("timestamp")
    )];

    if !classification.dimensions.is_empty() {
        let mut cols: Vec<String> = classification.dimensions.iter().map(|d| quote_ident(d)).collect();
        cols.push(format!("{} desc", quote_ident("timestamp")));
        statements.push(format!(
            "create index if not exists idx_{table_ident}_dims on {target} ({})",
            cols.join(", ")
        ));
    }

    for nonnumeric in &classification.nonnumeric {
        if nonnumeric.semantic_type == SemanticType::Json {
            statements.push(format!(
                "create index if not exists idx_{table_ident}_{col}_gin on {target} using gin ({ident})",
                col = nonnumeric.name,
                ident = quote_ident(&nonnumeric.name),
            ));
        }
    }

    statements
}

/// Choose a partition interval that fits a 256 MiB target chunk, rounded
/// down to the nearest of `{1h, 1d, 1w}`. Falls back to 1 day when there
/// isn't enough data to estimate from (a brand-new table, or an unknown
/// ingest rate).
pub fn optimize_chunk_interval(
    relation_size_bytes: Option<u64>,
    row_count: Option<u64>,
    rows_per_day: Option<u64>,
) -> Duration {
    const TARGET_CHUNK_BYTES: f64 = 256.0 * 1024.0 * 1024.0;

    let (Some(size), Some(rows), Some(daily_rows)) = (relation_size_bytes, row_count, rows_per_day) else {
        return Duration::days(1);
    };
    if rows == 0 || daily_rows == 0 {
        return Duration::days(1);
    }

    let bytes_per_row = size as f64 / rows as f64;
    let rows_per_chunk = TARGET_CHUNK_BYTES / bytes_per_row;
    let days_per_chunk = rows_per_chunk / daily_rows as f64;

    if days_per_chunk >= 7.0 {
        Duration::weeks(1)
    } else if days_per_chunk >= 1.0 {
        Duration::days(1)
    } else {
        Duration::hours(1)
    }
}

/// Re-estimate and apply the chunk interval for every active config, or
/// just the one naming `target` when scoped. A config whose relation
/// stats can't be read (brand-new, not yet materialised) is left alone
/// rather than reset to the 1-day default, since that default only
/// applies at creation time.
pub async fn maintain_timeseries_tables(
    pool: &PgPool,
    partition_manager: &dyn PartitionManager,
    target: Option<&str>,
) -> Result<Vec<(String, Duration)>> {
    let configs = configs::list_all_configs(pool).await?;
    let now = chrono::Utc::now();
    let mut updated = Vec::new();

    for config in configs
        .iter()
        .filter(|c| target.map(|t| t == c.target_table).unwrap_or(true))
    {
        let Some(stats) = inspector::relation_stats(pool, &config.target_table).await? else {
            continue;
        };
        let recent = rollup_db::logs::summarize_recent_refreshes(pool, now - Duration::hours(24))
            .await?
            .into_iter()
            .find(|s| s.table_name == config.target_table);
        let rows_per_day = recent.map(|s| s.total_rows_processed.max(0) as u64);

        let interval = optimize_chunk_interval(Some(stats.total_bytes), Some(stats.estimated_rows), rows_per_day);
        if interval.num_seconds() != config.chunk_interval_secs {
            configs::update_chunk_interval(pool, config.id, interval.num_seconds(), now).await?;
            partition_manager
                .create_parent(&config.target_table, "timestamp", interval, 4)
                .await?;
            updated.push((config.target_table.clone(), interval));
        }
    }

    partition_manager.run_maintenance().await?;

    Ok(updated)
}

/// Result of validating one active config (`ValidateRollupConfig`).
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub source_table: String,
    pub target_table: String,
    pub is_valid: bool,
    pub message: String,
}

/// Check that a config's target exists, its source has a timestamp column,
/// and every declared dimension exists on the target.
pub async fn validate_rollup_config(
    pool: &PgPool,
    schema_cache: &mut SchemaCache,
    source_table: &str,
    target_table: &str,
) -> Result<ValidationResult> {
    let source_columns = schema_cache.get_or_fetch(pool, source_table).await?.to_vec();
    let target_columns = schema_cache.get_or_fetch(pool, target_table).await?.to_vec();

    if target_columns.is_empty() {
        return Ok(ValidationResult {
            source_table: source_table.to_string(),
            target_table: target_table.to_string(),
            is_valid: false,
            message: format!("target table {target_table} does not exist"),
        });
    }

    let has_timestamp = source_columns
        .iter()
        .any(|c| c.name == "timestamp" && c.semantic_type == SemanticType::Timestamp);
    if !has_timestamp {
        return Ok(ValidationResult {
            source_table: source_table.to_string(),
            target_table: target_table.to_string(),
            is_valid: false,
            message: format!("source table {source_table} has no timestamp column"),
        });
    }

    let dimensions = configs::list_active_dimensions(pool, source_table).await?;
    let target_names: std::collections::HashSet<&str> = target_columns.iter().map(|c| c.name.as_str()).collect();
    let missing: Vec<&str> = dimensions
        .iter()
        .filter(|d| !target_names.contains(d.dimension_column.as_str()))
        .map(|d| d.dimension_column.as_str())
        .collect();

    if !missing.is_empty() {
        return Ok(ValidationResult {
            source_table: source_table.to_string(),
            target_table: target_table.to_string(),
            is_valid: false,
            message: format!("Missing dimension columns in target table: {}", missing.join(", ")),
        });
    }

    Ok(finish_valid(source_table, target_table))
}

fn finish_valid(source_table: &str, target_table: &str) -> ValidationResult {
    ValidationResult {
        source_table: source_table.to_string(),
        target_table: target_table.to_string(),
        is_valid: true,
        message: "ok".to_string(),
    }
}

/// `ValidateRollupConfig()`: run [`validate_rollup_config`] over every
/// active config, returning one row per config regardless of outcome.
pub async fn validate_all_active_configs(pool: &PgPool) -> Result<Vec<ValidationResult>> {
    let mut schema_cache = SchemaCache::new();
    let mut out = Vec::new();
    for config in configs::list_all_configs(pool).await? {
        if !config.is_active {
            continue;
        }
        out.push(
            validate_rollup_config(pool, &mut schema_cache, &config.source_table, &config.target_table).await?,
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_one_day_without_enough_data() {
        assert_eq!(optimize_chunk_interval(None, None, None), Duration::days(1));
        assert_eq!(optimize_chunk_interval(Some(100), Some(0), Some(10)), Duration::days(1));
    }

    #[test]
    fn high_ingest_rate_rounds_down_to_one_hour() {
        // 1 KiB/row, 10M rows/day -> a 256 MiB chunk holds far less than a day.
        let interval = optimize_chunk_interval(Some(1024 * 1_000_000), Some(1_000_000), Some(10_000_000));
        assert_eq!(interval, Duration::hours(1));
    }

    #[test]
    fn low_ingest_rate_rounds_down_to_one_week() {
        // Tiny table, trickle of rows/day -> a 256 MiB chunk covers many days.
        let interval = optimize_chunk_interval(Some(1024), Some(10), Some(1));
        assert_eq!(interval, Duration::weeks(1));
    }
}
