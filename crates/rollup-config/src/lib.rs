//! Typed runtime configuration for the rollup orchestrator.
//!
//! `std::env::var` calls are concentrated here; everything downstream reads
//! a [`Settings`] value built once at process start via [`Settings::from_env`].

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

pub mod secrets;

/// Name of the environment variable carrying the Postgres connection string.
pub const ENV_DB_URL: &str = "ROLLUP_DATABASE_URL";

/// Process-wide settings, loaded once at startup.
#[derive(Clone)]
pub struct Settings {
    pub database_url: String,
    pub http_bind_addr: SocketAddr,
    pub perform_rollup_interval: Duration,
    pub handle_retries_interval: Duration,
    pub maintain_tables_interval: Duration,
    pub worker_id: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("database_url", &"<REDACTED>")
            .field("http_bind_addr", &self.http_bind_addr)
            .field("perform_rollup_interval", &self.perform_rollup_interval)
            .field("handle_retries_interval", &self.handle_retries_interval)
            .field("maintain_tables_interval", &self.maintain_tables_interval)
            .field("worker_id", &self.worker_id)
            .finish()
    }
}

impl Settings {
    /// Load settings from the environment.
    ///
    /// Only `ROLLUP_DATABASE_URL` is required; everything else defaults to
    /// a sensible cadence (rollups every minute, retries every 5 minutes,
    /// table maintenance once a day).
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var(ENV_DB_URL)
            .with_context(|| format!("missing env var {ENV_DB_URL}"))?;

        let http_bind_addr = std::env::var("ROLLUP_DAEMON_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8900)));

        let perform_rollup_interval = env_secs("ROLLUP_PERFORM_ROLLUP_INTERVAL_SECS", 60);
        let handle_retries_interval = env_secs("ROLLUP_HANDLE_RETRIES_INTERVAL_SECS", 300);
        let maintain_tables_interval = env_secs("ROLLUP_MAINTAIN_TABLES_INTERVAL_SECS", 86_400);

        let worker_id = std::env::var("ROLLUP_WORKER_ID").unwrap_or_else(|_| default_worker_id());

        Ok(Self {
            database_url,
            http_bind_addr,
            perform_rollup_interval,
            handle_retries_interval,
            maintain_tables_interval,
            worker_id,
        })
    }
}

fn env_secs(var: &str, default_secs: u64) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

/// A reasonably unique, host-derived worker identity for lease claims.
/// Opaque from the database's point of view — only used for display and
/// for matching a lease back to the process that holds it.
fn default_worker_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "UNKNOWN_HOST".to_string());
    format!("{host}-{}", std::process::id())
}
