use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use tracing::{debug, info};

use crate::db::SqlitePool;
use crate::ingest_config::MergePolicy;
use crate::schema::state_vectors;
use crate::state_vectors::StateVector;

/// Rows written versus rows dropped as already-present duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Inserted, or updated in place under [`MergePolicy::Upsert`].
    pub written: usize,
    /// Existing keys left untouched under [`MergePolicy::Ignore`].
    pub duplicates: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to get database connection: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("database error: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("database task panicked or was cancelled: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Destination for a cycle's validated rows.
#[async_trait]
pub trait StateVectorSink: Send + Sync {
    /// Merge `records` as one atomic unit.
    async fn apply(
        &self,
        records: Vec<StateVector>,
        policy: MergePolicy,
    ) -> Result<ApplyOutcome, StoreError>;
}

#[derive(Clone)]
pub struct StateVectorsRepository {
    pool: SqlitePool,
}

impl StateVectorsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write every record inside one immediate transaction.
    ///
    /// Any error, including a check-constraint violation on a single row,
    /// rolls the whole batch back.
    fn apply_blocking(
        conn: &mut SqliteConnection,
        records: &[StateVector],
        policy: MergePolicy,
    ) -> Result<ApplyOutcome, diesel::result::Error> {
        conn.immediate_transaction(|conn| {
            let mut outcome = ApplyOutcome::default();
            for record in records {
                let affected = match policy {
                    MergePolicy::Ignore => diesel::insert_into(state_vectors::table)
                        .values(record)
                        .on_conflict((state_vectors::icao24, state_vectors::last_contact))
                        .do_nothing()
                        .execute(conn)?,
                    MergePolicy::Upsert => diesel::insert_into(state_vectors::table)
                        .values(record)
                        .on_conflict((state_vectors::icao24, state_vectors::last_contact))
                        .do_update()
                        .set((
                            state_vectors::callsign.eq(excluded(state_vectors::callsign)),
                            state_vectors::origin_country
                                .eq(excluded(state_vectors::origin_country)),
                            state_vectors::time_position.eq(excluded(state_vectors::time_position)),
                            state_vectors::longitude.eq(excluded(state_vectors::longitude)),
                            state_vectors::latitude.eq(excluded(state_vectors::latitude)),
                            state_vectors::baro_altitude.eq(excluded(state_vectors::baro_altitude)),
                            state_vectors::on_ground.eq(excluded(state_vectors::on_ground)),
                            state_vectors::velocity.eq(excluded(state_vectors::velocity)),
                            state_vectors::true_track.eq(excluded(state_vectors::true_track)),
                            state_vectors::vertical_rate.eq(excluded(state_vectors::vertical_rate)),
                            state_vectors::sensors.eq(excluded(state_vectors::sensors)),
                            state_vectors::geo_altitude.eq(excluded(state_vectors::geo_altitude)),
                            state_vectors::squawk.eq(excluded(state_vectors::squawk)),
                            state_vectors::spi.eq(excluded(state_vectors::spi)),
                            state_vectors::position_source
                                .eq(excluded(state_vectors::position_source)),
                            state_vectors::fetch_time.eq(excluded(state_vectors::fetch_time)),
                        ))
                        .execute(conn)?,
                };

                if affected == 0 {
                    outcome.duplicates += 1;
                } else {
                    outcome.written += 1;
                }
            }
            Ok(outcome)
        })
    }

    /// Look up one row by its natural key.
    pub async fn find(
        &self,
        icao24: &str,
        last_contact: i64,
    ) -> Result<Option<StateVector>, StoreError> {
        let pool = self.pool.clone();
        let icao24 = icao24.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let row = state_vectors::table
                .find((icao24, last_contact))
                .select(StateVector::as_select())
                .first(&mut conn)
                .optional()?;
            Ok::<Option<StateVector>, StoreError>(row)
        })
        .await?
    }

    /// Every row, ordered by key.
    pub async fn all(&self) -> Result<Vec<StateVector>, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows = state_vectors::table
                .order((state_vectors::icao24, state_vectors::last_contact))
                .select(StateVector::as_select())
                .load(&mut conn)?;
            Ok::<Vec<StateVector>, StoreError>(rows)
        })
        .await?
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let count: i64 = state_vectors::table.count().get_result(&mut conn)?;
            Ok::<i64, StoreError>(count)
        })
        .await?
    }
}

#[async_trait]
impl StateVectorSink for StateVectorsRepository {
    async fn apply(
        &self,
        records: Vec<StateVector>,
        policy: MergePolicy,
    ) -> Result<ApplyOutcome, StoreError> {
        if records.is_empty() {
            info!("No valid state vectors to write");
            return Ok(ApplyOutcome::default());
        }

        let pool = self.pool.clone();
        let total = records.len();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            Self::apply_blocking(&mut conn, &records, policy).map_err(StoreError::from)
        })
        .await??;

        debug!(
            "Applied {} state vectors ({}): {} written, {} duplicates",
            total, policy, outcome.written, outcome.duplicates
        );
        Ok(outcome)
    }
}
