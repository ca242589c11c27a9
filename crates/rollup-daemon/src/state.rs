//! Shared runtime state for rollup-daemon.
//!
//! Unlike the orchestrator crate, which is stateless between invocations,
//! the daemon process itself tracks a handful of in-memory counters for
//! the health endpoint (uptime, last scheduler tick) alongside the pool
//! every handler needs.

use std::sync::Arc;
use std::time::Instant;

use rollup_orchestrator::NullPartitionManager;
use sqlx::PgPool;
use tokio::sync::RwLock;

/// Static build metadata included in health responses.
#[derive(Clone, Debug, serde::Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Timestamp of the most recent completion of each scheduler tick, used by
/// `GET /v1/health` to surface whether the background loops are actually
/// running.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct TickTimestamps {
    pub last_perform_rollup: Option<chrono::DateTime<chrono::Utc>>,
    pub last_handle_retries: Option<chrono::DateTime<chrono::Utc>>,
    pub last_maintain_tables: Option<chrono::DateTime<chrono::Utc>>,
}

/// Cloneable (Arc) handle shared across all Axum handlers and scheduler
/// loops.
pub struct AppState {
    pub pool: PgPool,
    pub worker_id: String,
    pub build: BuildInfo,
    pub started_at: Instant,
    pub ticks: RwLock<TickTimestamps>,
    /// Injected collaborator per §6; `NullPartitionManager` until a real
    /// partition-manager integration is wired in for this deployment.
    pub partition_manager: Arc<NullPartitionManager>,
}

impl AppState {
    pub fn new(pool: PgPool, worker_id: String) -> Arc<Self> {
        Arc::new(Self {
            pool,
            worker_id,
            build: BuildInfo {
                service: "rollup-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            started_at: Instant::now(),
            ticks: RwLock::new(TickTimestamps::default()),
            partition_manager: Arc::new(NullPartitionManager),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
