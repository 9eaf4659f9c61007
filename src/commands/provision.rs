use anyhow::Result;
use tracing::info;

use contrail::db::{create_pool, provision_schema};
use contrail::ingest_config::DEFAULT_DATABASE_URL;

use super::resolve_database_url;

pub async fn handle_provision(database_url: Option<String>) -> Result<()> {
    let database_url = resolve_database_url(database_url, DEFAULT_DATABASE_URL);
    let pool = create_pool(&database_url)?;
    provision_schema(&pool).await?;
    info!("Database {} is ready for ingestion", database_url);
    Ok(())
}
