// DB-backed test, skipped if ROLLUP_DATABASE_URL is not set.
//
// Declares a dimension on the source that is never added to the target,
// then checks `rollup validate-rollup-config` surfaces it by name.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[tokio::test]
async fn validate_reports_missing_dimension_in_target() -> anyhow::Result<()> {
    let url = match std::env::var(rollup_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: ROLLUP_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new().max_connections(2).connect(&url).await?;
    rollup_db::migrate(&pool).await?;

    sqlx::query("drop table if exists cli_validate_test.source")
        .execute(&pool)
        .await
        .ok();
    sqlx::query("create schema if not exists cli_validate_test").execute(&pool).await?;
    sqlx::query("create table cli_validate_test.source (timestamp timestamptz not null, region text)")
        .execute(&pool)
        .await?;
    sqlx::query("create table if not exists gold.cli_validate_test_target (timestamp timestamptz not null)")
        .execute(&pool)
        .await
        .ok();

    sqlx::query(
        "insert into silver.dimension_configs (source_table, dimension_column, is_active) values ($1, 'region', true) on conflict do nothing",
    )
    .bind("cli_validate_test.source")
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"insert into silver.rollup_configs (
            source_table, target_table, is_active, rollup_interval_secs, look_back_window_secs,
            max_look_back_window_secs, processing_window_secs, chunk_interval_secs, retention_period_secs,
            max_execution_time_secs, alert_threshold_secs
        ) values ($1, $2, true, 3600, 7200, 86400, 3600, 86400, 2592000, 600, 300)
        on conflict (source_table, target_table) do update set is_active = true"#,
    )
    .bind("cli_validate_test.source")
    .bind("gold.cli_validate_test_target")
    .execute(&pool)
    .await?;

    let mut cmd = Command::cargo_bin("rollup")?;
    cmd.env("ROLLUP_DATABASE_URL", &url)
        .arg("validate-rollup-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Missing dimension columns in target table: region"));

    Ok(())
}
