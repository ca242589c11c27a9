//! Persistence layer for the rollup orchestrator. All authoritative state
//! lives in Postgres; the orchestrator holds nothing beyond a
//! per-invocation schema cache.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub mod activity;
pub mod configs;
pub mod inspector;
pub mod logs;

pub use inspector::{classify_data_type, split_qualified, SchemaCache};

pub const ENV_DB_URL: &str = rollup_config::ENV_DB_URL;

/// Connect to Postgres using `ROLLUP_DATABASE_URL`.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Test/dev helper: connect using `ROLLUP_DATABASE_URL` and ensure migrations
/// are applied.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}
