//! services/api/src/web/trainings.rs
//!
//! Handlers for training management, completion statistics and the incomplete list.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use roster_core::domain::{
    Actor, NewTraining, TargetUserTypes, Training, TrainingChanges, TrainingDetails, User,
};
use roster_core::ports::PortError;
use roster_core::{incomplete_by_deadline, summarize};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::middleware::AdminActor;
use crate::web::rest::{
    CreateTrainingRequest, DeleteResponse, ParticipationView, TrainingStatsResponse,
    TrainingView, TrainingWriteResponse, UpdateTrainingRequest, UserStatsResponse,
};
use crate::web::state::AppState;

//=========================================================================================
// Helpers
//=========================================================================================

fn parse_targets(labels: &[String]) -> (TargetUserTypes, Vec<String>) {
    let (targets, ignored) = TargetUserTypes::parse_lenient(labels);
    if !ignored.is_empty() {
        warn!(?ignored, "Ignoring unknown target user types");
    }
    (targets, ignored)
}

async fn user_index(state: &AppState) -> Result<HashMap<Uuid, User>, ApiError> {
    Ok(state
        .store
        .list_users()
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect())
}

async fn load_training(state: &AppState, training_id: Uuid) -> Result<Training, ApiError> {
    state
        .store
        .find_training(training_id)
        .await?
        .ok_or_else(|| PortError::NotFound(format!("Training {} not found", training_id)).into())
}

/// The training together with its current roster.
async fn training_view(state: &AppState, training: &Training) -> Result<TrainingView, ApiError> {
    let users = user_index(state).await?;
    let participants = state
        .store
        .participations_for_training(training.id)
        .await?
        .iter()
        .map(|p| ParticipationView::from(p).with_user(&users))
        .collect();
    Ok(TrainingView::new(training, participants))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List every training with its participants, newest first.
#[utoipa::path(
    get,
    path = "/trainings",
    responses(
        (status = 200, description = "All trainings", body = [TrainingView]),
        (status = 401, description = "Caller not identified")
    ),
    params(("x-user-id" = Uuid, Header, description = "The authenticated user."))
)]
pub async fn list_trainings_handler(
    State(state): State<Arc<AppState>>,
    Extension(_actor): Extension<Actor>,
) -> Result<Json<Vec<TrainingView>>, ApiError> {
    let users = user_index(&state).await?;
    let mut by_training: HashMap<Uuid, Vec<ParticipationView>> = HashMap::new();
    for p in state.store.list_participations().await? {
        by_training
            .entry(p.training_id)
            .or_default()
            .push(ParticipationView::from(&p).with_user(&users));
    }

    let views = state
        .store
        .list_trainings()
        .await?
        .iter()
        .map(|t| TrainingView::new(t, by_training.remove(&t.id).unwrap_or_default()))
        .collect();
    Ok(Json(views))
}

/// Fetch one training with its participants.
#[utoipa::path(
    get,
    path = "/trainings/{id}",
    responses(
        (status = 200, description = "The training", body = TrainingView),
        (status = 404, description = "No such training")
    ),
    params(
        ("id" = Uuid, Path, description = "Training id"),
        ("x-user-id" = Uuid, Header, description = "The authenticated user.")
    )
)]
pub async fn get_training_handler(
    State(state): State<Arc<AppState>>,
    Extension(_actor): Extension<Actor>,
    Path(training_id): Path<Uuid>,
) -> Result<Json<TrainingView>, ApiError> {
    let training = load_training(&state, training_id).await?;
    Ok(Json(training_view(&state, &training).await?))
}

/// Create a training and enroll every staff member of the targeted categories.
#[utoipa::path(
    post,
    path = "/trainings",
    request_body = CreateTrainingRequest,
    responses(
        (status = 201, description = "Training created", body = TrainingWriteResponse),
        (status = 400, description = "Missing name or manager"),
        (status = 403, description = "Caller is not an administrator")
    ),
    params(("x-user-id" = Uuid, Header, description = "An administrator."))
)]
pub async fn create_training_handler(
    State(state): State<Arc<AppState>>,
    AdminActor(actor): AdminActor,
    Json(req): Json<CreateTrainingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (targets, ignored) = parse_targets(&req.target_users);
    let new_training = NewTraining {
        name: req.name,
        description: req.description,
        deadline: req.deadline,
        target_user_types: targets,
        details: TrainingDetails {
            manager: req.manager,
            department: req.department,
            method: req.method,
            method_link: req.method_link,
            hours: req.hours,
            cycle: req.cycle,
            registration_book: req.registration_book,
            implementation_date: req.implementation_date,
        },
    };

    let (training, outcome) = state.reconciler.create_training(new_training).await?;
    info!(training_id = %training.id, created_by = %actor.user_id, "Training created via API");

    let response = TrainingWriteResponse {
        training: training_view(&state, &training).await?,
        reconciliation: Some(outcome.into()),
        ignored_target_users: ignored,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Edit a training. A `targetUsers` list re-matches the roster: staff who remain
/// targeted keep their records untouched, newly targeted staff are enrolled as
/// pending, and staff no longer targeted are removed.
#[utoipa::path(
    put,
    path = "/trainings/{id}",
    request_body = UpdateTrainingRequest,
    responses(
        (status = 200, description = "Training updated", body = TrainingWriteResponse),
        (status = 400, description = "Invalid field value"),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "No such training")
    ),
    params(
        ("id" = Uuid, Path, description = "Training id"),
        ("x-user-id" = Uuid, Header, description = "An administrator.")
    )
)]
pub async fn update_training_handler(
    State(state): State<Arc<AppState>>,
    AdminActor(_actor): AdminActor,
    Path(training_id): Path<Uuid>,
    Json(req): Json<UpdateTrainingRequest>,
) -> Result<Json<TrainingWriteResponse>, ApiError> {
    let (target_user_types, ignored) = match req.target_users.as_deref() {
        Some(labels) => {
            let (targets, ignored) = parse_targets(labels);
            (Some(targets), ignored)
        }
        None => (None, Vec::new()),
    };

    let changes = TrainingChanges {
        name: req.name,
        description: req.description,
        deadline: req.deadline,
        target_user_types,
        manager: req.manager,
        department: req.department,
        method: req.method,
        method_link: req.method_link,
        hours: req.hours,
        cycle: req.cycle,
        registration_book: req.registration_book,
        implementation_date: req.implementation_date,
    };

    let (training, outcome) = state.reconciler.update_training(training_id, changes).await?;

    Ok(Json(TrainingWriteResponse {
        training: training_view(&state, &training).await?,
        reconciliation: outcome.map(Into::into),
        ignored_target_users: ignored,
    }))
}

/// Delete a training together with its participants and reminder history.
#[utoipa::path(
    delete,
    path = "/trainings/{id}",
    responses(
        (status = 200, description = "Training deleted", body = DeleteResponse),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "No such training")
    ),
    params(
        ("id" = Uuid, Path, description = "Training id"),
        ("x-user-id" = Uuid, Header, description = "An administrator.")
    )
)]
pub async fn delete_training_handler(
    State(state): State<Arc<AppState>>,
    AdminActor(actor): AdminActor,
    Path(training_id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    if !state.store.delete_training(training_id).await? {
        return Err(PortError::NotFound(format!("Training {} not found", training_id)).into());
    }
    info!(%training_id, deleted_by = %actor.user_id, "Training deleted");
    Ok(Json(DeleteResponse {
        success: true,
        message: "Training deleted".to_string(),
    }))
}

/// Completion figures for one training.
#[utoipa::path(
    get,
    path = "/trainings/{id}/stats",
    responses(
        (status = 200, description = "Completion statistics", body = TrainingStatsResponse),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "No such training")
    ),
    params(
        ("id" = Uuid, Path, description = "Training id"),
        ("x-user-id" = Uuid, Header, description = "An administrator.")
    )
)]
pub async fn training_stats_handler(
    State(state): State<Arc<AppState>>,
    AdminActor(_actor): AdminActor,
    Path(training_id): Path<Uuid>,
) -> Result<Json<TrainingStatsResponse>, ApiError> {
    let training = load_training(&state, training_id).await?;
    let records = state.store.participations_for_training(training_id).await?;
    let users = user_index(&state).await?;
    let participants = records
        .iter()
        .map(|p| ParticipationView::from(p).with_user(&users))
        .collect();
    Ok(Json(TrainingStatsResponse::new(
        &training,
        summarize(&records),
        participants,
    )))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct IncompleteQuery {
    /// Restrict the list to one training.
    pub training_id: Option<Uuid>,
}

/// Participants who have not completed yet, earliest deadline first.
#[utoipa::path(
    get,
    path = "/stats/incomplete",
    responses(
        (status = 200, description = "Pending participations with user and training", body = [ParticipationView]),
        (status = 403, description = "Caller is not an administrator")
    ),
    params(
        IncompleteQuery,
        ("x-user-id" = Uuid, Header, description = "An administrator.")
    )
)]
pub async fn incomplete_list_handler(
    State(state): State<Arc<AppState>>,
    AdminActor(_actor): AdminActor,
    Query(query): Query<IncompleteQuery>,
) -> Result<Json<Vec<ParticipationView>>, ApiError> {
    let records = match query.training_id {
        Some(training_id) => state.store.participations_for_training(training_id).await?,
        None => state.store.list_participations().await?,
    };
    let trainings: HashMap<Uuid, Training> = state
        .store
        .list_trainings()
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();
    let users = user_index(&state).await?;

    let views: Vec<ParticipationView> = incomplete_by_deadline(records, &trainings)
        .iter()
        .map(|p| {
            ParticipationView::from(p)
                .with_user(&users)
                .with_training(trainings.get(&p.training_id))
        })
        .collect();
    info!(count = views.len(), training_id = ?query.training_id, "Incomplete list built");
    Ok(Json(views))
}

/// Completion figures for one staff member. Staff may only see their own.
#[utoipa::path(
    get,
    path = "/users/{id}/stats",
    responses(
        (status = 200, description = "Completion statistics", body = UserStatsResponse),
        (status = 403, description = "Not your own statistics"),
        (status = 404, description = "No such user")
    ),
    params(
        ("id" = Uuid, Path, description = "User id"),
        ("x-user-id" = Uuid, Header, description = "The authenticated user.")
    )
)]
pub async fn user_stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserStatsResponse>, ApiError> {
    if !actor.may_act_for(user_id) {
        return Err(PortError::Forbidden("Only your own statistics are visible".to_string()).into());
    }
    let user = state
        .store
        .find_user(user_id)
        .await?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;

    let records = state.store.participations_for_user(user_id).await?;
    let trainings: HashMap<Uuid, Training> = state
        .store
        .list_trainings()
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();
    let views = records
        .iter()
        .map(|p| ParticipationView::from(p).with_training(trainings.get(&p.training_id)))
        .collect();
    Ok(Json(UserStatsResponse::new(&user, summarize(&records), views)))
}
