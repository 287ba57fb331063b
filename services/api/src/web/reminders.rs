//! services/api/src/web/reminders.rs

use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::middleware::AdminActor;
use crate::web::rest::DueReminderView;
use crate::web::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DueRemindersQuery {
    /// Plan as of this day (midnight UTC). Defaults to now.
    pub date: Option<NaiveDate>,
}

/// Reminders that are due and have not been sent yet. Nothing is sent or recorded;
/// delivery is left to the mail relay.
#[utoipa::path(
    get,
    path = "/reminders/due",
    responses(
        (status = 200, description = "Reminders due", body = [DueReminderView]),
        (status = 403, description = "Caller is not an administrator")
    ),
    params(
        DueRemindersQuery,
        ("x-user-id" = Uuid, Header, description = "An administrator.")
    )
)]
pub async fn due_reminders_handler(
    State(state): State<Arc<AppState>>,
    AdminActor(_actor): AdminActor,
    Query(query): Query<DueRemindersQuery>,
) -> Result<Json<Vec<DueReminderView>>, ApiError> {
    let now = match query.date {
        Some(day) => day.and_time(NaiveTime::MIN).and_utc(),
        None => Utc::now(),
    };
    let due = state.planner.plan(now).await?;
    info!(count = due.len(), as_of = %now, "Due reminders planned");
    Ok(Json(due.into_iter().map(DueReminderView::from).collect()))
}
