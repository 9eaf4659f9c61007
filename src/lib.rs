pub mod clock;
pub mod db;
pub mod fetcher;
pub mod ingest;
pub mod ingest_config;
pub mod log_format;
pub mod metrics;
pub mod opensky_client;
pub mod reports;
pub mod schema;
pub mod state_vectors;
pub mod state_vectors_repo;

/// Build version: `git describe` output when built from a checkout, otherwise
/// the crate version.
pub fn version() -> &'static str {
    option_env!("VERGEN_GIT_DESCRIBE").unwrap_or(env!("CARGO_PKG_VERSION"))
}
