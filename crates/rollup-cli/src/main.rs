//! Operator CLI for the rollup orchestrator: one subcommand per entry in
//! spec §6's "CLI / operator surface".

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use rollup_orchestrator::{
    create_rollup_table, get_detailed_stats, get_partition_stats, handle_retries,
    maintain_timeseries_tables, perform_rollup, validate_all_active_configs, CreateRollupTableArgs,
    NullPartitionManager,
};
use rollup_schemas::LeaseStatus;

#[derive(Parser)]
#[command(name = "rollup")]
#[command(about = "Rollup orchestrator operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process all active configs, or just one source table's.
    PerformRollup {
        #[arg(long)]
        source: Option<String>,
    },

    /// Advance the retry queue: sweep configs whose backoff has elapsed.
    HandleRetries,

    /// Create a new rollup target table and register its config.
    CreateRollupTable {
        /// Qualified source table, e.g. `raw.metrics`.
        #[arg(long)]
        source: String,
        /// Schema the target table is created in, conventionally `gold`.
        #[arg(long)]
        target_schema: String,
        /// Target table name (unqualified).
        #[arg(long)]
        target_name: String,
        /// Rollup bucket width, in seconds.
        #[arg(long)]
        interval_secs: i64,
        /// First-run look-back, in seconds. Defaults to 2x the interval.
        #[arg(long)]
        look_back_secs: Option<i64>,
        /// Retention period, in seconds. Defaults to 30 days.
        #[arg(long)]
        retention_secs: Option<i64>,
        /// Initial processing window, in seconds. Defaults to the interval.
        #[arg(long)]
        processing_window_secs: Option<i64>,
        /// Register the config as active immediately.
        #[arg(long, default_value_t = true)]
        is_active: bool,
        /// Lease status to create the config with. Must be `idle`; a
        /// freshly created config has no worker to pair with `processing`.
        #[arg(long, default_value = "idle")]
        initial_status: String,
    },

    /// Reconcile chunk intervals against observed ingest rate, or just one
    /// target's.
    MaintainTimeseriesTables {
        #[arg(long)]
        target: Option<String>,
    },

    /// Relation size, row estimate, and observable partition layout for one
    /// target table.
    PartitionStats {
        table: String,
    },

    /// Health + performance snapshot for configs whose source or target
    /// table matches a SQL `LIKE` pattern.
    DetailedStats {
        pattern: String,
    },

    /// Check every active config: target exists, source has a timestamp
    /// column, declared dimensions exist on the target.
    ValidateRollupConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    let pool = rollup_db::connect_from_env().await.context("connecting to Postgres")?;
    let worker_id = rollup_config::Settings::from_env()
        .map(|s| s.worker_id)
        .unwrap_or_else(|_| format!("rollup-cli-{}", std::process::id()));

    match cli.cmd {
        Commands::PerformRollup { source } => {
            let report = perform_rollup(&pool, &worker_id, source.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::HandleRetries => {
            let report = handle_retries(&pool, &worker_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::CreateRollupTable {
            source,
            target_schema,
            target_name,
            interval_secs,
            look_back_secs,
            retention_secs,
            processing_window_secs,
            is_active,
            initial_status,
        } => {
            let args = CreateRollupTableArgs {
                source_table: source,
                target_schema,
                target_name,
                rollup_interval_secs: interval_secs,
                look_back_window_secs: look_back_secs.unwrap_or(interval_secs * 2),
                retention_period_secs: retention_secs.unwrap_or(Duration::days(30).num_seconds()),
                processing_window_secs: processing_window_secs.unwrap_or(interval_secs),
                is_active,
                initial_status: LeaseStatus::parse(&initial_status)?,
            };
            create_rollup_table(&pool, &NullPartitionManager, args).await?;
            println!("rollup_table_created=true");
        }

        Commands::MaintainTimeseriesTables { target } => {
            let updated = maintain_timeseries_tables(&pool, &NullPartitionManager, target.as_deref()).await?;
            for (table, interval) in &updated {
                println!("{table} chunk_interval_secs={}", interval.num_seconds());
            }
            if updated.is_empty() {
                println!("no chunk intervals required adjustment");
            }
        }

        Commands::PartitionStats { table } => match get_partition_stats(&pool, &table).await? {
            Some(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
            None => println!("table {table} does not exist"),
        },

        Commands::DetailedStats { pattern } => {
            let rows = get_detailed_stats(&pool, &pattern).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }

        Commands::ValidateRollupConfig => {
            let results = validate_all_active_configs(&pool).await?;
            for r in &results {
                println!(
                    "{} -> {}: valid={} {}",
                    r.source_table, r.target_table, r.is_valid, r.message
                );
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
