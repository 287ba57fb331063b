//! services/api/src/bin/due_reminders.rs
//!
//! Prints the reminders due today as JSON, one array on stdout, for the mail relay.

use api_lib::{
    adapters::DbAdapter, config::Config, error::ApiError, init_tracing, web::rest::DueReminderView,
};
use chrono::Utc;
use roster_core::ReminderPlanner;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let config = Config::from_env()?;
    init_tracing(config.log_level);

    let db_adapter = DbAdapter::connect(&config).await?;
    let planner = ReminderPlanner::new(Arc::new(db_adapter));
    let due: Vec<DueReminderView> = planner
        .plan(Utc::now())
        .await?
        .into_iter()
        .map(DueReminderView::from)
        .collect();
    info!(count = due.len(), "Due reminders planned");

    let json = serde_json::to_string_pretty(&due)
        .map_err(|e| ApiError::Internal(format!("Failed to encode reminders: {}", e)))?;
    println!("{}", json);
    Ok(())
}
