//! The polling loop: fetch a snapshot, normalize every state vector, merge the
//! batch into the store, then sleep out the rest of the interval.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::clock::Clock;
use crate::fetcher::StateFetcher;
use crate::ingest_config::MergePolicy;
use crate::opensky_client::SnapshotSource;
use crate::state_vectors::{RawObservation, StateVector};
use crate::state_vectors_repo::StateVectorSink;

/// Settings the scheduler needs once the run has started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleConfig {
    pub fetch_interval: Duration,
    pub run_duration: Duration,
    pub merge_policy: MergePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running { cycle: u64, ends_at: DateTime<Utc> },
    Finished,
}

/// What a single cycle produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The batch reached the store (possibly empty).
    Ingested {
        received: usize,
        written: usize,
        duplicates: usize,
        rejected: usize,
    },
    /// Every fetch attempt failed; nothing was written.
    Skipped { reason: String },
    /// The store refused the batch; it was rolled back.
    Failed { reason: String },
}

impl CycleOutcome {
    fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Ingested { .. } => "ingested",
            CycleOutcome::Skipped { .. } => "skipped",
            CycleOutcome::Failed { .. } => "failed",
        }
    }
}

/// Totals across a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub ingested: u64,
    pub skipped: u64,
    pub failed: u64,
    pub written: u64,
    pub duplicates: u64,
    pub rejected: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Ingested {
                written,
                duplicates,
                rejected,
                ..
            } => {
                self.ingested += 1;
                self.written += *written as u64;
                self.duplicates += *duplicates as u64;
                self.rejected += *rejected as u64;
            }
            CycleOutcome::Skipped { .. } => self.skipped += 1,
            CycleOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Normalize a snapshot's raw states, counting rejections.
pub fn normalize_batch(
    states: &[RawObservation],
    fetch_time: DateTime<Utc>,
) -> (Vec<StateVector>, usize) {
    let mut records = Vec::with_capacity(states.len());
    let mut rejected = 0;

    for raw in states {
        match StateVector::from_raw(raw, fetch_time) {
            Ok(record) => records.push(record),
            Err(reason) => {
                rejected += 1;
                metrics::counter!("ingest.records_rejected_total", "reason" => reason.label())
                    .increment(1);
                debug!("Rejected state vector: {}", reason);
            }
        }
    }

    (records, rejected)
}

/// Drives fetch → normalize → apply cycles at a fixed cadence until the run
/// deadline passes.
pub struct IngestScheduler<S, K> {
    fetcher: StateFetcher<S>,
    sink: K,
    clock: Arc<dyn Clock>,
    config: ScheduleConfig,
    state: SchedulerState,
}

impl<S, K> IngestScheduler<S, K>
where
    S: SnapshotSource,
    K: StateVectorSink,
{
    pub fn new(
        fetcher: StateFetcher<S>,
        sink: K,
        clock: Arc<dyn Clock>,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            fetcher,
            sink,
            clock,
            config,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Run cycles until `now >= start + run_duration`.
    ///
    /// Failed and skipped cycles are logged and counted; they never end the run.
    pub async fn run(&mut self) -> RunSummary {
        let started_at = self.clock.now();
        let ends_at = chrono::Duration::from_std(self.config.run_duration)
            .ok()
            .and_then(|d| started_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut summary = RunSummary::default();
        let mut cycle = 0;

        info!(
            "Starting ingest run until {} (interval {}s, merge policy {})",
            ends_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.config.fetch_interval.as_secs(),
            self.config.merge_policy
        );

        while self.clock.now() < ends_at {
            cycle += 1;
            self.state = SchedulerState::Running { cycle, ends_at };

            let cycle_start = self.clock.now();
            let outcome = self
                .run_cycle()
                .instrument(info_span!("ingest_cycle", cycle))
                .await;
            let cost = (self.clock.now() - cycle_start)
                .to_std()
                .unwrap_or(Duration::ZERO);

            metrics::counter!("ingest.cycles_total", "outcome" => outcome.label()).increment(1);
            metrics::histogram!("ingest.cycle_duration_seconds").record(cost.as_secs_f64());
            summary.record(&outcome);

            let sleep_for = self.config.fetch_interval.saturating_sub(cost);
            info!(
                "Cycle {} finished in {:.1}s. Sleeping for {:.1}s...",
                cycle,
                cost.as_secs_f64(),
                sleep_for.as_secs_f64()
            );
            self.clock.sleep(sleep_for).await;
        }

        self.state = SchedulerState::Finished;
        info!(
            "Ingest run complete: {} cycles ({} ingested, {} skipped, {} failed), {} rows written, {} duplicates, {} rejected",
            summary.cycles,
            summary.ingested,
            summary.skipped,
            summary.failed,
            summary.written,
            summary.duplicates,
            summary.rejected
        );
        summary
    }

    /// One fetch → normalize → apply pass.
    pub async fn run_cycle(&self) -> CycleOutcome {
        info!("Fetching state vectors...");
        let snapshot = match self.fetcher.fetch().await {
            Ok(snapshot) => snapshot,
            Err(failure) => {
                error!("Skipping this fetch cycle: {}", failure);
                return CycleOutcome::Skipped {
                    reason: failure.to_string(),
                };
            }
        };

        let received = snapshot.states.len();
        if received == 0 {
            warn!("No flight data received");
        }

        let fetch_time = self.clock.now();
        let (records, rejected) = normalize_batch(&snapshot.states, fetch_time);

        match self.sink.apply(records, self.config.merge_policy).await {
            Ok(applied) => {
                metrics::counter!("ingest.records_written_total").increment(applied.written as u64);
                metrics::counter!("ingest.records_duplicate_total")
                    .increment(applied.duplicates as u64);
                info!(
                    "Received {} state vectors: {} written, {} duplicates, {} rejected",
                    received, applied.written, applied.duplicates, rejected
                );
                CycleOutcome::Ingested {
                    received,
                    written: applied.written,
                    duplicates: applied.duplicates,
                    rejected,
                }
            }
            Err(e) => {
                error!("Database error, batch rolled back: {}", e);
                CycleOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
