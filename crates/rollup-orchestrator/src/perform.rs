//! The main rollup loop: claim a config, compute its window, build and
//! execute a plan, then record success or failure. `perform_rollup` and
//! `handle_retries` both drive this per-config path; the only difference
//! is which candidate set feeds it.

use chrono::{Duration, Utc};
use rollup_db::{configs, logs, SchemaCache};
use rollup_lease::{claim, retry, ReleaseOutcome};
use rollup_plan::{classify_source, project_against_target, render_plan};
use rollup_schemas::RollupConfig;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use crate::error::RollupError;

/// What happened to one candidate during a sweep, for callers that want a
/// summary (the CLI, the HTTP trigger route) without re-deriving it from
/// logs.
#[derive(Debug, Clone)]
pub enum ConfigOutcome {
    /// Another worker held a fresh lease; this candidate was left alone.
    ClaimMissed,
    /// Claimed, but the window computed empty; released with no progress.
    NoWork,
    /// Ran and committed a window successfully.
    Processed { rows: i64 },
}

/// Summary of one `perform_rollup`/`handle_retries` invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub claimed: usize,
    pub processed_rows: i64,
    pub failed: usize,
    pub skipped: usize,
}

/// Run the claim -> window -> plan -> execute -> record pipeline for a
/// single already-selected candidate. Errors inside this function are
/// caught by the caller and turned into a logged `ErrorLog` row plus a
/// scheduled retry; they never propagate out of a sweep.
#[instrument(skip(pool, schema_cache, candidate), fields(config_id = %candidate.id, source = %candidate.source_table, target = %candidate.target_table))]
async fn process_candidate(
    pool: &PgPool,
    worker_id: &str,
    schema_cache: &mut SchemaCache,
    candidate: &RollupConfig,
    now: chrono::DateTime<Utc>,
) -> Result<ConfigOutcome, RollupError> {
    let claimed = claim::try_claim(pool, candidate.id, worker_id, now).await?;
    let Some(claimed) = claimed else {
        return Ok(ConfigOutcome::ClaimMissed);
    };

    let max_execution_time = Duration::seconds(claimed.max_execution_time_secs);
    if let Some(started_at) = claimed.started_at {
        if claim::budget_exceeded(started_at, now, max_execution_time) {
            let err = RollupError::BudgetExceeded { config_id: claimed.id };
            let diagnostics = err.diagnostics("budget check", None);
            logs::append_error_log(
                pool,
                &claimed.source_table,
                &claimed.target_table,
                &diagnostics.message,
                None,
                None,
                None,
                diagnostics.context.as_deref(),
                None,
            )
            .await?;
            retry::schedule_retry(pool, claimed.id, worker_id, now).await?;
            return Err(err);
        }
    }

    let window = rollup_window::compute_window(
        now,
        claimed.last_processed_time,
        Duration::seconds(claimed.look_back_window_secs),
        Duration::seconds(claimed.processing_window_secs),
        Duration::seconds(claimed.max_look_back_window_secs),
        Duration::seconds(claimed.rollup_interval_secs),
        if claimed.last_processed_time.is_some() {
            rollup_db::activity::count_active_peers(pool).await.ok()
        } else {
            None
        },
    );

    let Some(window) = window else {
        claim::release_no_progress(pool, claimed.id, worker_id).await?;
        return Ok(ConfigOutcome::NoWork);
    };

    let source_columns = schema_cache.get_or_fetch(pool, &claimed.source_table).await?;
    let dimensions = configs::list_active_dimensions(pool, &claimed.source_table).await?;
    let (classification, missing_dimensions) = classify_source(source_columns, &dimensions);

    for missing in &missing_dimensions {
        warn!(dimension = %missing, "declared dimension missing from source table");
        logs::append_error_log(
            pool,
            &claimed.source_table,
            &claimed.target_table,
            &format!("dimension column check: {missing} not found on source"),
            None,
            None,
            None,
            Some("dimension column check"),
            None,
        )
        .await?;
    }

    let target_columns = schema_cache.get_or_fetch(pool, &claimed.target_table).await?;
    let projected = project_against_target(&classification, target_columns);

    let plan = render_plan(
        &claimed.source_table,
        &claimed.target_table,
        Duration::seconds(claimed.rollup_interval_secs),
        &classification.dimensions,
        &projected.numeric,
        &projected.nonnumeric,
    );

    if plan.is_degenerate() {
        let err = RollupError::PlanDegenerate {
            source: claimed.source_table.clone(),
            target: claimed.target_table.clone(),
        };
        let diagnostics = err.diagnostics("plan degeneracy check", None);
        logs::append_error_log(
            pool,
            &claimed.source_table,
            &claimed.target_table,
            &diagnostics.message,
            None,
            None,
            None,
            diagnostics.context.as_deref(),
            None,
        )
        .await?;
        retry::schedule_retry(pool, claimed.id, worker_id, now).await?;
        return Err(err);
    }

    let batch_start = now;
    let exec_result = sqlx::query(&plan.sql)
        .bind(window.start)
        .bind(window.end)
        .execute(pool)
        .await;

    match exec_result {
        Ok(result) => {
            let rows = result.rows_affected() as i64;
            let end_time = Utc::now();

            logs::append_refresh_log(pool, &claimed.target_table, batch_start, end_time, rows).await?;

            let elapsed = (end_time - batch_start).num_milliseconds() as f64 / 1000.0;
            let new_avg = 0.7 * claimed.avg_processing_time_secs + 0.3 * elapsed;
            let new_processing_window = rollup_window::next_processing_window(
                rows,
                Duration::seconds(claimed.processing_window_secs),
                Duration::seconds(claimed.max_look_back_window_secs),
            );

            let outcome = claim::release_success(
                pool,
                claimed.id,
                worker_id,
                window.end,
                new_processing_window.num_seconds(),
                new_avg,
                rows,
            )
            .await?;

            if outcome == ReleaseOutcome::LeaseLost {
                warn!("lease lost before release could apply the progress update");
            }

            info!(rows, "rollup window committed");
            Ok(ConfigOutcome::Processed { rows })
        }
        Err(err) => {
            let rollup_err = RollupError::from(err);
            let diagnostics = rollup_err.diagnostics("plan execution", Some(&plan.sql));

            logs::append_error_log(
                pool,
                &claimed.source_table,
                &claimed.target_table,
                &diagnostics.message,
                diagnostics.sql_state.as_deref(),
                diagnostics.detail.as_deref(),
                diagnostics.hint.as_deref(),
                diagnostics.context.as_deref(),
                diagnostics.attempted_query.as_deref(),
            )
            .await?;

            retry::schedule_retry(pool, claimed.id, worker_id, Utc::now()).await?;

            Err(rollup_err)
        }
    }
}

/// Load the candidate set and process each one in order, one window per
/// config per call. Errors inside a single candidate's processing are
/// caught here and recorded; only a failure to load the candidate set
/// itself propagates to the caller.
pub async fn perform_rollup(
    pool: &PgPool,
    worker_id: &str,
    specific_table: Option<&str>,
) -> anyhow::Result<SweepReport> {
    let loop_start = Utc::now();
    let candidates = configs::list_candidates(pool, specific_table, loop_start).await?;
    let mut schema_cache = SchemaCache::new();
    let mut report = SweepReport::default();

    for candidate in &candidates {
        let now = Utc::now();
        match process_candidate(pool, worker_id, &mut schema_cache, candidate, now).await {
            Ok(ConfigOutcome::ClaimMissed) => report.skipped += 1,
            Ok(ConfigOutcome::NoWork) => report.skipped += 1,
            Ok(ConfigOutcome::Processed { rows }) => {
                report.claimed += 1;
                report.processed_rows += rows;
            }
            Err(err) => {
                report.claimed += 1;
                report.failed += 1;
                warn!(error = %err, config_id = %candidate.id, "rollup attempt failed");
            }
        }
    }

    let elapsed = Utc::now() - loop_start;
    if elapsed > Duration::seconds(candidates.iter().map(|c| c.alert_threshold_secs).max().unwrap_or(300)) {
        warn!(elapsed_secs = elapsed.num_seconds(), "perform_rollup sweep exceeded its alert threshold");
    }

    Ok(report)
}

/// Sweep configs whose backoff has elapsed and re-run the rollup path for
/// each, scoped to its own source table.
pub async fn handle_retries(pool: &PgPool, worker_id: &str) -> anyhow::Result<SweepReport> {
    let now = Utc::now();
    let due = configs::list_due_retries(pool, now).await?;
    let mut schema_cache = SchemaCache::new();
    let mut report = SweepReport::default();

    for candidate in &due {
        match process_candidate(pool, worker_id, &mut schema_cache, candidate, Utc::now()).await {
            Ok(ConfigOutcome::ClaimMissed) => report.skipped += 1,
            Ok(ConfigOutcome::NoWork) => report.skipped += 1,
            Ok(ConfigOutcome::Processed { rows }) => {
                report.claimed += 1;
                report.processed_rows += rows;
            }
            Err(err) => {
                report.claimed += 1;
                report.failed += 1;
                warn!(error = %err, config_id = %candidate.id, "retry attempt failed");
            }
        }
    }

    Ok(report)
}
