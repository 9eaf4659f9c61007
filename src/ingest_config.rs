use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://opensky-network.org/api/states/all";
pub const DEFAULT_DATABASE_URL: &str = "opensky.db";

/// How a state vector whose (icao24, last_contact) already exists is merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Keep the first-seen row, drop the newcomer.
    Ignore,
    /// Overwrite every non-key column, including fetch_time.
    #[default]
    Upsert,
}

impl std::fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergePolicy::Ignore => write!(f, "ignore"),
            MergePolicy::Upsert => write!(f, "upsert"),
        }
    }
}

/// OpenSky account used for authenticated (higher rate limit) requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub username: String,
    pub password: String,
}

impl ApiCredentials {
    /// Read `OPENSKY_USERNAME` / `OPENSKY_PASSWORD`; both must be set.
    pub fn from_env() -> Option<Self> {
        let username = std::env::var("OPENSKY_USERNAME").ok()?;
        let password = std::env::var("OPENSKY_PASSWORD").ok()?;
        if username.is_empty() {
            return None;
        }
        Some(Self { username, password })
    }
}

/// Ingestion settings, fixed for the lifetime of a run.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub api_url: String,
    pub database_url: String,
    /// Target cadence between cycle starts.
    pub fetch_interval_secs: u64,
    /// Total wall-clock length of the run.
    pub run_duration_hours: f64,
    /// Attempts per fetch, including the first.
    pub max_retries: u32,
    /// Wait after failed attempt `n` is `backoff_base^n` seconds.
    pub backoff_base: u64,
    pub request_timeout_secs: u64,
    pub merge_policy: MergePolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            fetch_interval_secs: 600,
            run_duration_hours: 24.0,
            max_retries: 5,
            backoff_base: 2,
            request_timeout_secs: 15,
            merge_policy: MergePolicy::Upsert,
        }
    }
}

impl IngestConfig {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: IngestConfig =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(config)
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            anyhow::bail!("api_url must not be empty");
        }
        if self.database_url.trim().is_empty() {
            anyhow::bail!("database_url must not be empty");
        }
        if self.fetch_interval_secs == 0 {
            anyhow::bail!("fetch_interval_secs must be at least 1");
        }
        if !(self.run_duration_hours.is_finite() && self.run_duration_hours > 0.0) {
            anyhow::bail!(
                "run_duration_hours must be positive, got {}",
                self.run_duration_hours
            );
        }
        self.run_duration()?;
        if self.max_retries == 0 {
            anyhow::bail!("max_retries must be at least 1");
        }
        if self.backoff_base == 0 {
            anyhow::bail!("backoff_base must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }

    /// Fails when the hour count does not fit in a `Duration`.
    pub fn run_duration(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.run_duration_hours * 3600.0).with_context(|| {
            format!(
                "run_duration_hours {} is out of range",
                self.run_duration_hours
            )
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Resolve the ingest config file path.
///
/// Priority:
/// 1. `CONTRAIL_INGEST_CONFIG` env var
/// 2. `./ingest.toml`, when it exists
pub fn ingest_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CONTRAIL_INGEST_CONFIG") {
        return Some(PathBuf::from(path));
    }

    let local = PathBuf::from("./ingest.toml");
    local.exists().then_some(local)
}
