//! rollup-orchestrator
//!
//! Ties schema introspection, lease claiming, window computation, and plan
//! rendering into the handful of entry points the daemon and CLI actually
//! call: run a sweep, check on it, or bootstrap a new target table.

pub mod bootstrap;
pub mod error;
pub mod monitor;
pub mod partitions;
pub mod perform;

pub use bootstrap::{
    create_rollup_table, maintain_timeseries_tables, optimize_chunk_interval, validate_all_active_configs,
    validate_rollup_config, CreateRollupTableArgs, ValidationResult,
};
pub use error::{ErrorDiagnostics, RollupError};
pub use monitor::{derive_health, get_detailed_stats, get_partition_stats, snapshot, ConfigStatus, PartitionStats};
pub use partitions::{NullPartitionManager, PartitionManager};
pub use perform::{handle_retries, perform_rollup, ConfigOutcome, SweepReport};
