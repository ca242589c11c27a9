//! Abstraction over the external partition manager. Consumed as an opaque
//! service: create a partitioned parent, trigger its periodic maintenance,
//! and set a retention policy. Implementations are expected to wrap
//! something like `pg_partman`; this crate never talks to it directly.

use async_trait::async_trait;
use chrono::Duration;

#[async_trait]
pub trait PartitionManager: Send + Sync {
    async fn create_parent(
        &self,
        table: &str,
        control_column: &str,
        interval: Duration,
        premake: u32,
    ) -> anyhow::Result<()>;

    async fn run_maintenance(&self) -> anyhow::Result<()>;

    async fn set_retention(
        &self,
        table: &str,
        retention: Duration,
        keep_table: bool,
        infinite: bool,
    ) -> anyhow::Result<()>;
}

/// No-op partition manager for environments without a partitioning
/// extension installed, and for tests that only exercise the rest of the
/// bootstrap pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPartitionManager;

#[async_trait]
impl PartitionManager for NullPartitionManager {
    async fn create_parent(
        &self,
        _table: &str,
        _control_column: &str,
        _interval: Duration,
        _premake: u32,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn run_maintenance(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn set_retention(
        &self,
        _table: &str,
        _retention: Duration,
        _keep_table: bool,
        _infinite: bool,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
