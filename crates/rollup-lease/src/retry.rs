//! Retry scheduling after a failed run: exponential backoff persisted on
//! the config row, swept by a separate entry point rather than an in-memory
//! timer.

use chrono::{DateTime, Duration, Utc};

/// Compute the next retry fields after the `retry_count`'th consecutive
/// failure (1-indexed: pass the *new* count, already incremented).
///
/// Backoff is `5 min * 2^(retry_count - 1)`, uncapped — operators are
/// expected to bound it by deactivating a config that fails persistently.
pub fn next_retry_time(now: DateTime<Utc>, retry_count: i32) -> DateTime<Utc> {
    let exponent = (retry_count - 1).max(0) as u32;
    let backoff = Duration::minutes(5) * 2i32.pow(exponent);
    now + backoff
}

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

/// Record a failed run: release the lease, bump `retry_count`, and stamp
/// `last_error_time`/`next_retry_time`. Guarded by `worker_id = :self` like
/// the success path, so a takeover during a failing run is still handled
/// correctly.
pub async fn schedule_retry(pool: &PgPool, config_id: Uuid, worker_id: &str, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        r#"
        update silver.rollup_configs
        set status = 'idle',
            worker_id = null,
            started_at = null,
            retry_count = retry_count + 1,
            last_error_time = $3,
            next_retry_time = $3 + make_interval(mins => 5) * power(2, greatest(retry_count, 0))
        where id = $1 and worker_id = $2
        "#,
    )
    .bind(config_id)
    .bind(worker_id)
    .bind(now)
    .execute(pool)
    .await
    .context("schedule_retry failed")?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn backoff_doubles_each_attempt() {
        let now = t(0);
        assert_eq!(next_retry_time(now, 1), now + Duration::minutes(5));
        assert_eq!(next_retry_time(now, 2), now + Duration::minutes(10));
        assert_eq!(next_retry_time(now, 3), now + Duration::minutes(20));
        assert_eq!(next_retry_time(now, 4), now + Duration::minutes(40));
    }

    #[test]
    fn zero_or_negative_retry_count_is_treated_as_first_attempt() {
        let now = t(0);
        assert_eq!(next_retry_time(now, 0), now + Duration::minutes(5));
    }
}
