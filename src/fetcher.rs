use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::opensky_client::{FetchError, Snapshot, SnapshotSource};

/// Attempt budget and backoff curve for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff_base: u64,
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based): `backoff_base^attempt` seconds.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_base.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: 2,
        }
    }
}

/// Every attempt failed; the cycle gets no data.
#[derive(Debug, thiserror::Error)]
#[error("fetch failed after {attempts} attempt(s): {last_error}")]
pub struct FetchFailure {
    pub attempts: u32,
    pub last_error: FetchError,
}

/// Wraps a [`SnapshotSource`] with retry and exponential backoff.
pub struct StateFetcher<S> {
    source: S,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl<S: SnapshotSource> StateFetcher<S> {
    pub fn new(source: S, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            source,
            clock,
            policy,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch one snapshot, retrying transient failures.
    ///
    /// Never returns early on the first error; only after `max_attempts`
    /// failures does it give up with a [`FetchFailure`].
    pub async fn fetch(&self) -> Result<Snapshot, FetchFailure> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            metrics::counter!("ingest.fetch_attempts_total").increment(1);
            match self.source.fetch_snapshot().await {
                Ok(snapshot) => {
                    if attempt > 1 {
                        info!("Fetch succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    return Ok(snapshot);
                }
                Err(e) if attempt < max_attempts => {
                    let wait = self.policy.backoff(attempt);
                    warn!(
                        "Fetch attempt {}/{} failed: {}. Retrying in {}s...",
                        attempt,
                        max_attempts,
                        e,
                        wait.as_secs()
                    );
                    self.clock.sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    metrics::counter!("ingest.fetch_failures_total").increment(1);
                    error!(
                        "Fetch attempt {}/{} failed: {}. Max retries reached",
                        attempt, max_attempts, e
                    );
                    return Err(FetchFailure {
                        attempts: attempt,
                        last_error: e,
                    });
                }
            }
        }
    }
}
