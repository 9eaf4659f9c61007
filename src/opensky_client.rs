use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::ingest_config::ApiCredentials;
use crate::state_vectors::RawObservation;

/// Body of `GET /api/states/all`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatesResponse {
    /// Server time the snapshot refers to (unix seconds).
    #[serde(default)]
    pub time: Option<i64>,
    /// `null` when nothing is tracked.
    #[serde(default)]
    pub states: Option<Vec<RawObservation>>,
}

/// A decoded snapshot of every tracked aircraft.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub time: Option<i64>,
    pub states: Vec<RawObservation>,
}

impl From<StatesResponse> for Snapshot {
    fn from(response: StatesResponse) -> Self {
        Self {
            time: response.time,
            states: response.states.unwrap_or_default(),
        }
    }
}

/// A single failed attempt. All variants are treated as transient.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP status {status}")]
    Status { status: StatusCode },
}

/// Something that can produce one snapshot per call, without retrying.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError>;
}

/// HTTP client for the OpenSky Network REST API.
#[derive(Debug, Clone)]
pub struct OpenSkyClient {
    client: reqwest::Client,
    url: String,
    credentials: Option<ApiCredentials>,
}

impl OpenSkyClient {
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        credentials: Option<ApiCredentials>,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("contrail/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            credentials,
        })
    }
}

#[async_trait]
impl SnapshotSource for OpenSkyClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError> {
        let mut request = self.client.get(&self.url);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status });
        }

        let body: StatesResponse = response.json().await?;
        let snapshot = Snapshot::from(body);
        debug!(
            "Received {} state vectors (server time {:?})",
            snapshot.states.len(),
            snapshot.time
        );
        Ok(snapshot)
    }
}
