//! Wire types for the daemon's JSON responses. Kept separate from the
//! handlers so the shapes are easy to scan in one place.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// Body for `POST /v1/rollup/run`. `source_table` scopes the sweep the
/// same way the CLI's `--source` flag does; omitted means "all active
/// configs".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRollupRequest {
    pub source_table: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
