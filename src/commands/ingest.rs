use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use contrail::clock::{Clock, SystemClock};
use contrail::db::{create_pool, provision_schema, verify_schema};
use contrail::fetcher::{RetryPolicy, StateFetcher};
use contrail::ingest::{IngestScheduler, ScheduleConfig};
use contrail::ingest_config::{ApiCredentials, IngestConfig, MergePolicy, ingest_config_path};
use contrail::opensky_client::OpenSkyClient;
use contrail::state_vectors_repo::StateVectorsRepository;

/// Command-line settings that take precedence over the config file.
#[derive(Debug, Default)]
pub struct IngestOverrides {
    pub config: Option<PathBuf>,
    pub database_url: Option<String>,
    pub api_url: Option<String>,
    pub interval_secs: Option<u64>,
    pub duration_hours: Option<f64>,
    pub max_retries: Option<u32>,
    pub backoff_base: Option<u64>,
    pub merge_policy: Option<MergePolicy>,
    pub provision: bool,
    pub metrics_port: Option<u16>,
}

impl IngestOverrides {
    fn apply(self, mut config: IngestConfig) -> IngestConfig {
        if let Some(database_url) = self.database_url.or_else(|| std::env::var("DATABASE_URL").ok())
        {
            config.database_url = database_url;
        }
        if let Some(api_url) = self.api_url {
            config.api_url = api_url;
        }
        if let Some(interval_secs) = self.interval_secs {
            config.fetch_interval_secs = interval_secs;
        }
        if let Some(duration_hours) = self.duration_hours {
            config.run_duration_hours = duration_hours;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(backoff_base) = self.backoff_base {
            config.backoff_base = backoff_base;
        }
        if let Some(merge_policy) = self.merge_policy {
            config.merge_policy = merge_policy;
        }
        config
    }
}

fn load_config(path: Option<PathBuf>) -> Result<IngestConfig> {
    match path.or_else(ingest_config_path) {
        Some(path) => {
            info!("Loading ingest config from {:?}", path);
            IngestConfig::load(&path)
        }
        None => Ok(IngestConfig::default()),
    }
}

pub async fn handle_ingest(overrides: IngestOverrides) -> Result<()> {
    info!("contrail {} starting OpenSky ingestion", contrail::version());

    let provision = overrides.provision;
    let metrics_port = overrides.metrics_port;
    let file_config = load_config(overrides.config.clone())?;
    let config = overrides.apply(file_config);
    config.validate().context("Invalid ingest configuration")?;

    // Storage problems are fatal before the first cycle, unlike per-cycle failures
    let pool = create_pool(&config.database_url)?;
    if provision {
        provision_schema(&pool).await?;
    } else {
        verify_schema(&pool).await?;
    }

    if let Some(port) = metrics_port {
        // Install the recorder before the first cycle so no samples are lost
        let handle = contrail::metrics::init_metrics()?;
        contrail::metrics::initialize_ingest_metrics();
        tokio::spawn(async move {
            if let Err(e) = contrail::metrics::start_metrics_server(handle, port).await {
                error!("Metrics server stopped: {:#}", e);
            }
        });
    }

    let credentials = ApiCredentials::from_env();
    if credentials.is_some() {
        info!("Using authenticated OpenSky requests");
    } else {
        info!("No OpenSky credentials set, using anonymous requests");
    }
    let client = OpenSkyClient::new(&config.api_url, config.request_timeout(), credentials)
        .context("Failed to build HTTP client")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fetcher = StateFetcher::new(
        client,
        clock.clone(),
        RetryPolicy {
            max_attempts: config.max_retries,
            backoff_base: config.backoff_base,
        },
    );
    let repo = StateVectorsRepository::new(pool);
    let mut scheduler = IngestScheduler::new(
        fetcher,
        repo,
        clock,
        ScheduleConfig {
            fetch_interval: config.fetch_interval(),
            run_duration: config.run_duration()?,
            merge_policy: config.merge_policy,
        },
    );

    let summary = scheduler.run().await;
    info!(
        "Finished: {} cycles, {} rows written to {}",
        summary.cycles, summary.written, config.database_url
    );
    Ok(())
}
