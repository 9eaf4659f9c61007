use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use contrail::db::{create_pool, verify_schema};
use contrail::ingest_config::DEFAULT_DATABASE_URL;
use contrail::reports;

use super::resolve_database_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportKind {
    Airlines,
    Density,
    Hourly,
    All,
}

impl ReportKind {
    fn includes(self, other: ReportKind) -> bool {
        self == ReportKind::All || self == other
    }
}

pub async fn handle_report(
    database_url: Option<String>,
    kind: ReportKind,
    out_dir: PathBuf,
    limit: i64,
    min_aircraft: i64,
) -> Result<()> {
    let database_url = resolve_database_url(database_url, DEFAULT_DATABASE_URL);
    let pool = create_pool(&database_url)?;
    verify_schema(&pool).await?;

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create output directory {:?}", out_dir))?;

    if kind.includes(ReportKind::Airlines) {
        let rows = reports::busiest_airlines(&pool, limit).await?;
        info!("Top {} airlines by airborne position updates", rows.len());
        reports::write_csv(&rows, &out_dir.join("busiest_airlines.csv"))?;
    }

    if kind.includes(ReportKind::Density) {
        let rows = reports::high_density_zones(&pool, min_aircraft).await?;
        info!(
            "{} grid cells with at least {} aircraft",
            rows.len(),
            min_aircraft
        );
        reports::write_csv(&rows, &out_dir.join("high_density_zones.csv"))?;
    }

    if kind.includes(ReportKind::Hourly) {
        let rows = reports::hourly_activity(&pool).await?;
        reports::write_csv(&rows, &out_dir.join("hourly_activity.csv"))?;
    }

    Ok(())
}
