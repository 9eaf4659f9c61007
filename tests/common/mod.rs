//! Common test utilities for database-backed integration tests
//!
//! Each `TestDatabase` is a fresh SQLite file inside its own temporary
//! directory with the `state_vectors` schema already provisioned, so tests
//! run in parallel without sharing state. The directory is removed when the
//! value is dropped.
//!
//! # Usage
//!
//! ```no_run
//! use common::TestDatabase;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let test_db = TestDatabase::new()
//!         .await
//!         .expect("Failed to create test database");
//!     let pool = test_db.pool();
//! }
//! ```

#![allow(dead_code)]

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

use contrail::db::{SqlitePool, create_pool, provision_schema};
use contrail::state_vectors::{RawObservation, StateVector};

pub struct TestDatabase {
    pool: SqlitePool,
    url: String,
    _dir: TempDir,
}

impl TestDatabase {
    /// Create a provisioned database in a new temporary directory.
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("Failed to create temp dir")?;
        let url = dir
            .path()
            .join("opensky_test.db")
            .to_str()
            .context("Temp path is not valid UTF-8")?
            .to_string();
        let pool = create_pool(&url)?;
        provision_schema(&pool).await?;
        Ok(Self {
            pool,
            url,
            _dir: dir,
        })
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

pub fn fetch_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// A well-formed 17-field state tuple for an airborne aircraft.
pub fn raw_state(icao24: &str, callsign: &str, last_contact: i64) -> RawObservation {
    RawObservation(json!([
        icao24,
        callsign,
        "United States",
        last_contact - 1,
        last_contact,
        -73.78,
        40.64,
        3048.0,
        false,
        154.3,
        87.5,
        5.2,
        null,
        3100.0,
        "1200",
        false,
        0
    ]))
}

/// Same tuple placed at an explicit position.
pub fn raw_state_at(icao24: &str, last_contact: i64, lat: f64, lon: f64, on_ground: bool) -> RawObservation {
    RawObservation(json!([
        icao24, "TEST1", "Germany", null, last_contact, lon, lat, 1000.0, on_ground, 100.0, 90.0,
        0.0, null, 1100.0, null, false, 0
    ]))
}

/// Normalize `raw_state` at `fetch_time()`.
pub fn state_vector(icao24: &str, callsign: &str, last_contact: i64) -> StateVector {
    StateVector::from_raw(&raw_state(icao24, callsign, last_contact), fetch_time())
        .expect("fixture tuple should normalize")
}
