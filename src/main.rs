use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use contrail::ingest_config::MergePolicy;
use contrail::log_format::TargetFirstFormat;
use contrail::reports::{DEFAULT_AIRLINE_LIMIT, DEFAULT_MIN_AIRCRAFT_PER_CELL};

mod commands;

use commands::{IngestOverrides, ReportKind, handle_ingest, handle_provision, handle_report};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser)]
#[command(name = "contrail")]
#[command(about = "Poll OpenSky state vectors into a local SQLite store")]
#[command(version = contrail::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the state_vectors table and its indexes
    Provision {
        /// SQLite database path (defaults to DATABASE_URL, then opensky.db)
        #[arg(long)]
        database_url: Option<String>,
    },
    /// Fetch, normalize and store state vectors on a fixed cadence
    Ingest {
        /// TOML config file (defaults to CONTRAIL_INGEST_CONFIG, then ./ingest.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        database_url: Option<String>,

        /// OpenSky states endpoint
        #[arg(long)]
        api_url: Option<String>,

        /// Seconds between cycle starts
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Total run length in hours
        #[arg(long)]
        duration_hours: Option<f64>,

        /// Fetch attempts per cycle, including the first
        #[arg(long)]
        max_retries: Option<u32>,

        /// Backoff after failed attempt n is base^n seconds
        #[arg(long)]
        backoff_base: Option<u64>,

        /// What to do with a state vector whose key is already stored
        #[arg(long, value_enum)]
        merge_policy: Option<MergePolicy>,

        /// Create the schema before the first cycle instead of requiring it
        #[arg(long, default_value_t = false)]
        provision: bool,

        /// Serve Prometheus metrics on this port
        #[arg(long)]
        metrics_port: Option<u16>,
    },
    /// Export aggregate reports as CSV
    Report {
        #[arg(long)]
        database_url: Option<String>,

        #[arg(long, value_enum, default_value_t = ReportKind::All)]
        kind: ReportKind,

        /// Directory the CSV files are written to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Number of airlines in the busiest-airlines report
        #[arg(long, default_value_t = DEFAULT_AIRLINE_LIMIT)]
        limit: i64,

        /// Minimum distinct aircraft for a grid cell to be reported
        #[arg(long, default_value_t = DEFAULT_MIN_AIRCRAFT_PER_CELL)]
        min_aircraft: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(TargetFirstFormat::new(std::io::IsTerminal::is_terminal(
            &std::io::stderr(),
        )))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Provision { database_url } => handle_provision(database_url).await,
        Commands::Ingest {
            config,
            database_url,
            api_url,
            interval_secs,
            duration_hours,
            max_retries,
            backoff_base,
            merge_policy,
            provision,
            metrics_port,
        } => {
            handle_ingest(IngestOverrides {
                config,
                database_url,
                api_url,
                interval_secs,
                duration_hours,
                max_retries,
                backoff_base,
                merge_policy,
                provision,
                metrics_port,
            })
            .await
        }
        Commands::Report {
            database_url,
            kind,
            out_dir,
            limit,
            min_aircraft,
        } => handle_report(database_url, kind, out_dir, limit, min_aircraft).await,
    }
}
