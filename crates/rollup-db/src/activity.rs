//! Read-only `pg_stat_activity` sampling used by the window controller's
//! load adjustment. Best-effort: a failed sample should never block a
//! rollup run, only fall back to an unadjusted window.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};

/// Count active peer backends on the same database, excluding this
/// connection and anything tagged as an introspection query
/// (`application_name` prefixed `rollup-introspect`).
pub async fn count_active_peers(pool: &PgPool) -> Result<i64> {
    let row = sqlx::query(
        r#"
        select count(*)::bigint as n
        from pg_stat_activity
        where datname = current_database()
          and pid <> pg_backend_pid()
          and state = 'active'
          and coalesce(application_name, '') not like 'rollup-introspect%'
        "#,
    )
    .fetch_one(pool)
    .await
    .context("count_active_peers failed")?;

    row.try_get::<i64, _>("n").context("read peer count")
}
