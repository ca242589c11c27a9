//! Shared data-model types for the rollup orchestrator.
//!
//! This crate is pure data: no I/O, no sqlx. Durations are stored as whole
//! seconds (`i64`) rather than `chrono::Duration` so every field round-trips
//! through Postgres `bigint` columns without a custom `INTERVAL` codec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The lease half of `RollupConfig`.
///
/// `Idle` always pairs with `worker_id = None, started_at = None`;
/// `Processing` always pairs with both present. The orchestrator never
/// constructs a value that violates this — see `rollup-lease`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Idle,
    Processing,
}

impl LeaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseStatus::Idle => "idle",
            LeaseStatus::Processing => "processing",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "idle" => Ok(LeaseStatus::Idle),
            "processing" => Ok(LeaseStatus::Processing),
            other => anyhow::bail!("invalid lease status: {other}"),
        }
    }
}

/// One row of `silver.rollup_configs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupConfig {
    pub id: Uuid,

    // Identity
    pub source_table: String,
    pub target_table: String,
    pub is_active: bool,

    // Aggregation parameters (all durations in whole seconds)
    pub rollup_interval_secs: i64,
    pub look_back_window_secs: i64,
    pub max_look_back_window_secs: i64,
    pub processing_window_secs: i64,
    pub chunk_interval_secs: i64,
    pub retention_period_secs: i64,

    // Progress
    pub last_processed_time: Option<DateTime<Utc>>,

    // Lease
    pub status: LeaseStatus,
    pub worker_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,

    // History
    pub avg_processing_time_secs: f64,
    pub last_processed_rows: Option<i64>,
    pub last_optimization_time: Option<DateTime<Utc>>,

    // Failure
    pub retry_count: i32,
    pub last_error_time: Option<DateTime<Utc>>,
    pub next_retry_time: Option<DateTime<Utc>>,

    // SLA
    pub max_execution_time_secs: i64,
    pub alert_threshold_secs: i64,
}

impl RollupConfig {
    /// True when lease fields are either all-absent or all-present.
    pub fn lease_is_clean(&self) -> bool {
        match self.status {
            LeaseStatus::Idle => self.worker_id.is_none() && self.started_at.is_none(),
            LeaseStatus::Processing => self.worker_id.is_some() && self.started_at.is_some(),
        }
    }
}

/// One row of `silver.dimension_configs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionConfig {
    pub id: Uuid,
    pub source_table: String,
    pub dimension_column: String,
    pub is_active: bool,
}

/// One append-only row of `silver.refresh_log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshLogRow {
    pub id: Uuid,
    pub table_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub records_processed: i64,
    pub refresh_timestamp: DateTime<Utc>,
}

impl RefreshLogRow {
    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }

    pub fn is_success(&self) -> bool {
        self.records_processed > 0
    }
}

/// One append-only row of `silver.error_log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogRow {
    pub id: Uuid,
    pub source_table: String,
    pub target_table: String,
    pub error_timestamp: DateTime<Utc>,
    pub message: String,
    pub sql_state: Option<String>,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub context: Option<String>,
    pub attempted_query: Option<String>,
}

/// Semantic classification of a source/target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Timestamp,
    Numeric,
    Json,
    Other,
}

/// One column as returned by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub semantic_type: SemanticType,
    /// Raw `information_schema.columns.data_type` string, kept verbatim so
    /// bootstrap can declare a target column with the same type as its
    /// source counterpart.
    pub pg_type: String,
}

/// Health classification surfaced by the operations monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Running,
    Warning,
    Alert,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "OK",
            HealthStatus::Running => "RUNNING",
            HealthStatus::Warning => "WARNING",
            HealthStatus::Alert => "ALERT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_clean_idle() {
        let cfg = sample_config(LeaseStatus::Idle, None, None);
        assert!(cfg.lease_is_clean());
    }

    #[test]
    fn lease_dirty_idle_with_worker() {
        let cfg = sample_config(LeaseStatus::Idle, Some("w1".into()), None);
        assert!(!cfg.lease_is_clean());
    }

    #[test]
    fn lease_clean_processing() {
        let cfg = sample_config(LeaseStatus::Processing, Some("w1".into()), Some(Utc::now()));
        assert!(cfg.lease_is_clean());
    }

    #[test]
    fn lease_dirty_processing_missing_started_at() {
        let cfg = sample_config(LeaseStatus::Processing, Some("w1".into()), None);
        assert!(!cfg.lease_is_clean());
    }

    fn sample_config(
        status: LeaseStatus,
        worker_id: Option<String>,
        started_at: Option<DateTime<Utc>>,
    ) -> RollupConfig {
        RollupConfig {
            id: Uuid::new_v4(),
            source_table: "raw.metrics".into(),
            target_table: "gold.metrics_1h".into(),
            is_active: true,
            rollup_interval_secs: 3600,
            look_back_window_secs: 7200,
            max_look_back_window_secs: 86400,
            processing_window_secs: 3600,
            chunk_interval_secs: 86400,
            retention_period_secs: 30 * 86400,
            last_processed_time: None,
            status,
            worker_id,
            started_at,
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
}
