//! Read-only operational projection over `RollupConfig`, joined with the
//! latest `ErrorLog` entry and a 24-hour `RefreshLog` summary per
//! (source, target) pair. No writes happen here.

use chrono::{DateTime, Duration, Utc};
use rollup_db::{configs, inspector, logs};
use rollup_schemas::{ErrorLogRow, HealthStatus, RollupConfig};
use serde::Serialize;
use sqlx::PgPool;

/// One row of the operations snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigStatus {
    pub config: RollupConfig,
    pub health: HealthStatus,
    pub latest_error: Option<ErrorLogRow>,
    pub recent_run_count: i64,
    pub recent_success_count: i64,
    pub recent_avg_duration_secs: f64,
}

/// Derive the health classification for one config at `now`.
pub fn derive_health(config: &RollupConfig, now: DateTime<Utc>) -> HealthStatus {
    use rollup_schemas::LeaseStatus;

    let is_stale = config.status == LeaseStatus::Processing
        && config
            .started_at
            .map(|started| started < now - Duration::seconds(config.alert_threshold_secs))
            .unwrap_or(false);

    if is_stale {
        HealthStatus::Alert
    } else if config.retry_count > 3 {
        HealthStatus::Warning
    } else if config.status == LeaseStatus::Processing {
        HealthStatus::Running
    } else {
        HealthStatus::Ok
    }
}

/// Build the full snapshot over every config in `configs`.
pub async fn snapshot(pool: &PgPool, configs: Vec<RollupConfig>) -> anyhow::Result<Vec<ConfigStatus>> {
    let now = Utc::now();
    let summaries = logs::summarize_recent_refreshes(pool, now - Duration::hours(24)).await?;

    let mut out = Vec::with_capacity(configs.len());
    for config in configs {
        let latest_error = logs::latest_error_for(pool, &config.source_table, &config.target_table).await?;
        let summary = summaries.iter().find(|s| s.table_name == config.target_table);
        let health = derive_health(&config, now);

        out.push(ConfigStatus {
            recent_run_count: summary.map(|s| s.run_count).unwrap_or(0),
            recent_success_count: summary.map(|s| s.success_count).unwrap_or(0),
            recent_avg_duration_secs: summary.map(|s| s.avg_duration_secs).unwrap_or(0.0),
            health,
            latest_error,
            config,
        });
    }

    Ok(out)
}

/// Relation size/row estimate plus observable partition layout for one
/// target table (`GetPartitionStats`). Physical partition maintenance is
/// owned by the external partition manager; this is a read-only view over
/// what the catalog already shows.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionStats {
    pub table: String,
    pub total_bytes: u64,
    pub estimated_rows: u64,
    pub partition_count: usize,
    pub chunk_interval_secs: Option<i64>,
}

/// `GetPartitionStats(table)`: `None` when the table doesn't exist (not
/// yet created, or a typo in the operator's argument).
pub async fn get_partition_stats(pool: &PgPool, qualified_table: &str) -> anyhow::Result<Option<PartitionStats>> {
    let Some(stats) = inspector::relation_stats(pool, qualified_table).await? else {
        return Ok(None);
    };
    let partitions = inspector::list_partitions(pool, qualified_table).await?;
    let chunk_interval_secs = configs::list_all_configs(pool)
        .await?
        .into_iter()
        .find(|c| c.target_table == qualified_table)
        .map(|c| c.chunk_interval_secs);

    Ok(Some(PartitionStats {
        table: qualified_table.to_string(),
        total_bytes: stats.total_bytes,
        estimated_rows: stats.estimated_rows,
        partition_count: partitions.len(),
        chunk_interval_secs,
    }))
}

/// `GetDetailedStats(pattern)`: the same health/performance snapshot as
/// [`snapshot`], scoped to configs whose source or target table matches a
/// SQL `LIKE` pattern (e.g. `"gold.%"`).
pub async fn get_detailed_stats(pool: &PgPool, pattern: &str) -> anyhow::Result<Vec<ConfigStatus>> {
    let matching = configs::list_configs_matching(pool, pattern).await?;
    snapshot(pool, matching).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollup_schemas::LeaseStatus;
    use uuid::Uuid;

    fn base_config() -> RollupConfig {
        RollupConfig {
            id: Uuid::new_v4(),
            source_table: "raw.metrics".into(),
            target_table: "gold.metrics_1h".into(),
            is_active: true,
            rollup_interval_secs: 3600,
            look_back_window_secs: 7200,
            max_look_back_window_secs: 86_400,
            processing_window_secs: 3600,
            chunk_interval_secs: 86_400,
            retention_period_secs: 30 * 86_400,
            last_processed_time: None,
            status: LeaseStatus::Idle,
            worker_id: None,
            started_at: None,
            avg_processing_time_secs: 0.0,
            last_processed_rows: None,
            last_optimization_time: None,
            retry_count: 0,
            last_error_time: None,
            next_retry_time: None,
            max_execution_time_secs: 600,
            alert_threshold_secs: 300,
        }
    }

    #[test]
    fn idle_with_no_retries_is_ok() {
        let cfg = base_config();
        assert_eq!(derive_health(&cfg, Utc::now()), HealthStatus::Ok);
    }

    #[test]
    fn running_within_alert_threshold_is_running() {
        let mut cfg = base_config();
        cfg.status = LeaseStatus::Processing;
        cfg.worker_id = Some("w1".into());
        cfg.started_at = Some(Utc::now());
        assert_eq!(derive_health(&cfg, Utc::now()), HealthStatus::Running);
    }

    #[test]
    fn stale_lease_past_alert_threshold_is_alert() {
        let mut cfg = base_config();
        cfg.status = LeaseStatus::Processing;
        cfg.worker_id = Some("w1".into());
        cfg.started_at = Some(Utc::now() - Duration::seconds(cfg.alert_threshold_secs + 1));
        assert_eq!(derive_health(&cfg, Utc::now()), HealthStatus::Alert);
    }

    #[test]
    fn many_retries_while_idle_is_warning() {
        let mut cfg = base_config();
        cfg.retry_count = 4;
        assert_eq!(derive_health(&cfg, Utc::now()), HealthStatus::Warning);
    }

    #[test]
    fn stale_lease_outranks_high_retry_count() {
        let mut cfg = base_config();
        cfg.status = LeaseStatus::Processing;
        cfg.worker_id = Some("w1".into());
        cfg.started_at = Some(Utc::now() - Duration::seconds(cfg.alert_threshold_secs + 1));
        cfg.retry_count = 10;
        assert_eq!(derive_health(&cfg, Utc::now()), HealthStatus::Alert);
    }
}
