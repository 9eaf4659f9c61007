//! SQLite connection pooling and schema provisioning.

pub mod provision;

use anyhow::{Context, Result};
use diesel::SqliteConnection;
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use std::time::Duration;
use tracing::info;

pub use provision::{provision_schema, verify_schema};

pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Applies per-connection pragmas every time the pool hands out a fresh connection.
#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;",
            self.busy_timeout.as_millis()
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Open a connection pool against a SQLite database file.
///
/// The pool eagerly opens a connection, so an unreachable or unwritable
/// database path fails here rather than on the first cycle.
pub fn create_pool(database_url: &str) -> Result<SqlitePool> {
    info!("Opening database at {}...", database_url);
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(4)
        .connection_customizer(Box::new(ConnectionPragmas {
            busy_timeout: BUSY_TIMEOUT,
        }))
        .build(manager)
        .with_context(|| format!("Failed to open database {}", database_url))?;
    info!("Database connection pool created");
    Ok(pool)
}
