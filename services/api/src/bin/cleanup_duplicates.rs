//! services/api/src/bin/cleanup_duplicates.rs
//!
//! One-off sweep that merges duplicate participation records. Safe to re-run.

use api_lib::{adapters::DbAdapter, config::Config, error::ApiError, init_tracing};
use roster_core::DuplicateResolver;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let config = Config::from_env()?;
    init_tracing(config.log_level);

    let db_adapter = DbAdapter::connect(&config).await?;
    db_adapter.run_migrations().await?;

    let resolver =
        DuplicateResolver::with_concurrency(Arc::new(db_adapter), config.resolver_concurrency);
    let report = resolver.resolve_duplicates().await?;

    if report.groups_failed > 0 {
        warn!(
            found = report.groups_found,
            resolved = report.groups_resolved,
            failed = report.groups_failed,
            deleted = report.records_deleted,
            "Duplicate cleanup finished with failures; re-run to retry"
        );
    } else {
        info!(
            found = report.groups_found,
            resolved = report.groups_resolved,
            deleted = report.records_deleted,
            "Duplicate cleanup finished"
        );
    }
    Ok(())
}
