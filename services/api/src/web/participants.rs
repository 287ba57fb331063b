//! services/api/src/web/participants.rs
//!
//! Handlers for rosters, self-reported completion numbers, and duplicate cleanup.

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use roster_core::domain::{Actor, Training, User};
use roster_core::ports::PortError;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::middleware::AdminActor;
use crate::web::rest::{CleanupResponse, CompletionNumberRequest, ParticipationView};
use crate::web::state::AppState;

/// Roster of one training, ordered by participant name.
#[utoipa::path(
    get,
    path = "/participants/training/{training_id}",
    responses(
        (status = 200, description = "Participants of the training", body = [ParticipationView]),
        (status = 404, description = "No such training")
    ),
    params(
        ("training_id" = Uuid, Path, description = "Training id"),
        ("x-user-id" = Uuid, Header, description = "The authenticated user.")
    )
)]
pub async fn list_training_participants_handler(
    State(state): State<Arc<AppState>>,
    Extension(_actor): Extension<Actor>,
    Path(training_id): Path<Uuid>,
) -> Result<Json<Vec<ParticipationView>>, ApiError> {
    let training = state
        .store
        .find_training(training_id)
        .await?
        .ok_or_else(|| PortError::NotFound(format!("Training {} not found", training_id)))?;
    let users: HashMap<Uuid, User> = state
        .store
        .list_users()
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let mut views: Vec<ParticipationView> = state
        .store
        .participations_for_training(training_id)
        .await?
        .iter()
        .map(|p| {
            ParticipationView::from(p)
                .with_user(&users)
                .with_training(Some(&training))
        })
        .collect();
    views.sort_by(|a, b| {
        let name = |v: &ParticipationView| v.user.as_ref().map(|u| u.name.clone()).unwrap_or_default();
        name(a).cmp(&name(b))
    });

    info!(%training_id, count = views.len(), "Roster listed");
    Ok(Json(views))
}

/// The caller's own trainings: unfinished first, then by latest deadline.
#[utoipa::path(
    get,
    path = "/participants/my-trainings",
    responses(
        (status = 200, description = "The caller's participations", body = [ParticipationView])
    ),
    params(("x-user-id" = Uuid, Header, description = "The authenticated user."))
)]
pub async fn my_trainings_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<ParticipationView>>, ApiError> {
    let trainings: HashMap<Uuid, Training> = state
        .store
        .list_trainings()
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    let mut records = state.store.participations_for_user(actor.user_id).await?;
    records.sort_by(|a, b| {
        let deadline = |p: &roster_core::Participation| {
            trainings.get(&p.training_id).and_then(|t| t.deadline)
        };
        match (a.is_completed(), b.is_completed()) {
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
            // Latest deadline first; trainings without one go last.
            _ => deadline(b).cmp(&deadline(a)),
        }
    });

    let views = records
        .iter()
        .map(|p| ParticipationView::from(p).with_training(trainings.get(&p.training_id)))
        .collect();
    Ok(Json(views))
}

/// Record a completion number. Staff may only record their own; administrators any.
#[utoipa::path(
    put,
    path = "/participants/{id}/completion-number",
    request_body = CompletionNumberRequest,
    responses(
        (status = 200, description = "Participation marked completed", body = ParticipationView),
        (status = 400, description = "Empty completion number"),
        (status = 403, description = "Not your own participation"),
        (status = 404, description = "No such participation")
    ),
    params(
        ("id" = Uuid, Path, description = "Participation id"),
        ("x-user-id" = Uuid, Header, description = "The authenticated user.")
    )
)]
pub async fn update_completion_number_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(participation_id): Path<Uuid>,
    Json(req): Json<CompletionNumberRequest>,
) -> Result<Json<ParticipationView>, ApiError> {
    let participation = state
        .recorder
        .record(&actor, participation_id, &req.completion_number)
        .await?;
    let training = state.store.find_training(participation.training_id).await?;
    Ok(Json(
        ParticipationView::from(&participation).with_training(training.as_ref()),
    ))
}

/// Merge duplicate participations so each (training, user) pair has one record.
#[utoipa::path(
    post,
    path = "/participants/cleanup-duplicates",
    responses(
        (status = 200, description = "Sweep finished; see counts for partial failures", body = CleanupResponse),
        (status = 403, description = "Caller is not an administrator")
    ),
    params(("x-user-id" = Uuid, Header, description = "An administrator."))
)]
pub async fn cleanup_duplicates_handler(
    State(state): State<Arc<AppState>>,
    AdminActor(actor): AdminActor,
) -> Result<Json<CleanupResponse>, ApiError> {
    info!(requested_by = %actor.user_id, "Duplicate cleanup requested");
    let report = state.resolver.resolve_duplicates().await?;
    Ok(Json(report.into()))
}
