pub mod ingest;
pub mod provision;
pub mod report;

pub use ingest::{IngestOverrides, handle_ingest};
pub use provision::handle_provision;
pub use report::{ReportKind, handle_report};

/// Database path precedence: command-line flag, then `DATABASE_URL`, then `fallback`.
fn resolve_database_url(flag: Option<String>, fallback: &str) -> String {
    flag.or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| fallback.to_string())
}
