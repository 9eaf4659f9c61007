//! Read-only aggregate reports over `state_vectors`, exported as CSV.

use anyhow::{Context, Result};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable, Text};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::db::SqlitePool;

pub const DEFAULT_AIRLINE_LIMIT: i64 = 20;
pub const DEFAULT_MIN_AIRCRAFT_PER_CELL: i64 = 3;

/// A report row with a fixed CSV column layout.
pub trait CsvRecord: Serialize {
    /// Column names, in field order.
    const HEADERS: &'static [&'static str];
}

/// Position updates per airline, keyed by the ICAO airline designator that
/// prefixes most commercial callsigns.
#[derive(Debug, Clone, PartialEq, Eq, QueryableByName, Serialize)]
pub struct AirlineActivity {
    #[diesel(sql_type = Text)]
    pub airline_code: String,
    #[diesel(sql_type = BigInt)]
    pub position_updates: i64,
}

impl CsvRecord for AirlineActivity {
    const HEADERS: &'static [&'static str] = &["airline_code", "position_updates"];
}

/// Distinct airborne aircraft per 1°×1° cell (coordinates truncated toward zero).
#[derive(Debug, Clone, PartialEq, Eq, QueryableByName, Serialize)]
pub struct DensityCell {
    #[diesel(sql_type = BigInt)]
    pub lat_grid: i64,
    #[diesel(sql_type = BigInt)]
    pub lon_grid: i64,
    #[diesel(sql_type = BigInt)]
    pub aircraft_count: i64,
}

impl CsvRecord for DensityCell {
    const HEADERS: &'static [&'static str] = &["lat_grid", "lon_grid", "aircraft_count"];
}

#[derive(Debug, Clone, PartialEq, Eq, QueryableByName)]
struct HourlyRow {
    #[diesel(sql_type = Nullable<Text>)]
    hour_of_day: Option<String>,
    #[diesel(sql_type = BigInt)]
    flight_activity_count: i64,
}

/// Airborne observations per UTC hour of `last_contact`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyActivity {
    pub hour_of_day: u32,
    pub flight_activity_count: i64,
    /// `HH:00`, for spreadsheet tools that sort text.
    pub hour_formatted: String,
}

impl CsvRecord for HourlyActivity {
    const HEADERS: &'static [&'static str] =
        &["hour_of_day", "flight_activity_count", "hour_formatted"];
}

impl HourlyActivity {
    fn from_row(row: HourlyRow) -> Result<Self> {
        let raw = row
            .hour_of_day
            .context("last_contact produced no hour of day")?;
        let hour: u32 = raw
            .parse()
            .with_context(|| format!("Invalid hour of day '{}'", raw))?;
        Ok(Self {
            hour_of_day: hour,
            flight_activity_count: row.flight_activity_count,
            hour_formatted: format!("{:02}:00", hour),
        })
    }
}

pub async fn busiest_airlines(pool: &SqlitePool, limit: i64) -> Result<Vec<AirlineActivity>> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().context("Failed to get database connection")?;
        let rows = diesel::sql_query(
            "SELECT SUBSTR(UPPER(callsign), 1, 3) AS airline_code, \
                    COUNT(*) AS position_updates \
             FROM state_vectors \
             WHERE callsign IS NOT NULL AND LENGTH(callsign) > 3 AND on_ground = 0 \
             GROUP BY airline_code \
             ORDER BY position_updates DESC, airline_code ASC \
             LIMIT ?",
        )
        .bind::<BigInt, _>(limit)
        .load::<AirlineActivity>(&mut conn)
        .context("Failed to query busiest airlines")?;
        Ok::<Vec<AirlineActivity>, anyhow::Error>(rows)
    })
    .await?
}

pub async fn high_density_zones(pool: &SqlitePool, min_aircraft: i64) -> Result<Vec<DensityCell>> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().context("Failed to get database connection")?;
        let rows = diesel::sql_query(
            "SELECT CAST(latitude AS INTEGER) AS lat_grid, \
                    CAST(longitude AS INTEGER) AS lon_grid, \
                    COUNT(DISTINCT icao24) AS aircraft_count \
             FROM state_vectors \
             WHERE on_ground = 0 AND latitude IS NOT NULL AND longitude IS NOT NULL \
             GROUP BY lat_grid, lon_grid \
             HAVING aircraft_count >= ? \
             ORDER BY aircraft_count DESC, lat_grid ASC, lon_grid ASC",
        )
        .bind::<BigInt, _>(min_aircraft)
        .load::<DensityCell>(&mut conn)
        .context("Failed to query high-density zones")?;
        Ok::<Vec<DensityCell>, anyhow::Error>(rows)
    })
    .await?
}

pub async fn hourly_activity(pool: &SqlitePool) -> Result<Vec<HourlyActivity>> {
    let pool = pool.clone();
    let rows = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().context("Failed to get database connection")?;
        let rows = diesel::sql_query(
            "SELECT strftime('%H', last_contact, 'unixepoch') AS hour_of_day, \
                    COUNT(*) AS flight_activity_count \
             FROM state_vectors \
             WHERE on_ground = 0 \
               AND strftime('%H', last_contact, 'unixepoch') IS NOT NULL \
             GROUP BY hour_of_day \
             ORDER BY hour_of_day",
        )
        .load::<HourlyRow>(&mut conn)
        .context("Failed to query hourly activity")?;
        Ok::<Vec<HourlyRow>, anyhow::Error>(rows)
    })
    .await??;

    rows.into_iter().map(HourlyActivity::from_row).collect()
}

/// Write `rows` to `path` as CSV with a header row, even when `rows` is empty.
pub fn write_csv<T: CsvRecord>(rows: &[T], path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    writer
        .write_record(T::HEADERS)
        .with_context(|| format!("Failed to write header to {:?}", path))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write row to {:?}", path))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {:?}", path))?;
    info!("Saved {} records to {:?}", rows.len(), path);
    Ok(())
}
