use anyhow::{Context, Result};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use tracing::info;

use super::SqlitePool;

pub const STATE_VECTORS_TABLE: &str = "state_vectors";

/// Table plus the two indexes the report queries lean on. Every statement is
/// `IF NOT EXISTS`, so running this against a provisioned database is a no-op.
const STATE_VECTORS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS state_vectors (
    icao24          TEXT    NOT NULL CHECK (length(icao24) > 0),
    callsign        TEXT,
    origin_country  TEXT    NOT NULL,
    time_position   INTEGER,
    last_contact    INTEGER NOT NULL,
    longitude       REAL    CHECK (longitude BETWEEN -180 AND 180),
    latitude        REAL    CHECK (latitude BETWEEN -90 AND 90),
    baro_altitude   REAL,
    on_ground       INTEGER NOT NULL CHECK (on_ground IN (0, 1)),
    velocity        REAL,
    true_track      REAL    CHECK (true_track BETWEEN 0 AND 360),
    vertical_rate   REAL,
    sensors         TEXT,
    geo_altitude    REAL,
    squawk          TEXT    CHECK (squawk IS NULL OR length(squawk) = 4),
    spi             INTEGER NOT NULL CHECK (spi IN (0, 1)),
    position_source INTEGER CHECK (position_source IN (0, 1, 2)),
    fetch_time      TIMESTAMP NOT NULL,
    PRIMARY KEY (icao24, last_contact)
);

CREATE INDEX IF NOT EXISTS idx_state_vectors_origin_country
    ON state_vectors (origin_country);

CREATE INDEX IF NOT EXISTS idx_state_vectors_last_contact
    ON state_vectors (last_contact);
"#;

#[derive(QueryableByName)]
struct TableCount {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

/// Create the `state_vectors` table and its indexes if they are missing.
pub async fn provision_schema(pool: &SqlitePool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().context("Failed to get database connection")?;
        info!("Ensuring {} table and indexes exist...", STATE_VECTORS_TABLE);
        conn.batch_execute(STATE_VECTORS_DDL)
            .context("Failed to provision state_vectors schema")?;
        info!("Schema ready");
        Ok::<(), anyhow::Error>(())
    })
    .await?
}

/// Fail unless the `state_vectors` table is present.
///
/// Ingestion never creates the schema on its own; a missing table is a
/// startup error rather than something each cycle trips over.
pub async fn verify_schema(pool: &SqlitePool) -> Result<()> {
    let pool = pool.clone();
    let present = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().context("Failed to get database connection")?;
        let row = diesel::sql_query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind::<Text, _>(STATE_VECTORS_TABLE)
        .get_result::<TableCount>(&mut conn)
        .context("Failed to inspect database schema")?;
        Ok::<bool, anyhow::Error>(row.count > 0)
    })
    .await??;

    if !present {
        anyhow::bail!(
            "Table {} does not exist; run `contrail provision` or pass --provision",
            STATE_VECTORS_TABLE
        );
    }
    Ok(())
}
