//! services/api/src/web/users.rs
//!
//! Administrator handlers for staff accounts. PIN handling lives with the login
//! service in front of this API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use roster_core::domain::{NewUser, Role, UserChanges, UserType};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::middleware::AdminActor;
use crate::web::rest::{CreateUserRequest, DeleteResponse, UpdateUserRequest, UserView};
use crate::web::state::AppState;

fn parse_user_type(label: &str) -> Result<UserType, ApiError> {
    UserType::from_label(label.trim())
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown user type '{}'", label)))
}

fn parse_role(value: &str) -> Result<Role, ApiError> {
    Role::parse(value.trim())
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown role '{}'", value)))
}

/// List every staff account, ordered by name.
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All staff accounts", body = [UserView]),
        (status = 403, description = "Caller is not an administrator")
    ),
    params(("x-user-id" = Uuid, Header, description = "An administrator."))
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    AdminActor(_actor): AdminActor,
) -> Result<Json<Vec<UserView>>, ApiError> {
    let users = state.store.list_users().await?;
    Ok(Json(users.iter().map(UserView::from).collect()))
}

/// Register a staff member. The e-mail is lower-cased and must be unique.
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User registered", body = UserView),
        (status = 400, description = "Missing name, malformed or duplicate e-mail, unknown type or role"),
        (status = 403, description = "Caller is not an administrator")
    ),
    params(("x-user-id" = Uuid, Header, description = "An administrator."))
)]
pub async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    AdminActor(actor): AdminActor,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_type = match req.user_type.as_deref() {
        Some(label) if !label.trim().is_empty() => parse_user_type(label)?,
        _ => UserType::SchoolPersonnel,
    };
    let role = match req.role.as_deref() {
        Some(value) => parse_role(value)?,
        None => Role::User,
    };

    let user = state
        .directory
        .create_user(NewUser {
            name: req.name,
            email: req.email,
            user_type,
            role,
        })
        .await?;
    info!(user_id = %user.id, created_by = %actor.user_id, "User created via API");
    Ok((StatusCode::CREATED, Json(UserView::from(&user))))
}

/// Edit a staff member's name, e-mail, type or role.
#[utoipa::path(
    put,
    path = "/users/{id}",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserView),
        (status = 400, description = "Nothing to update, or an invalid or duplicate value"),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "No such user")
    ),
    params(
        ("id" = Uuid, Path, description = "User id"),
        ("x-user-id" = Uuid, Header, description = "An administrator.")
    )
)]
pub async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    AdminActor(_actor): AdminActor,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserView>, ApiError> {
    let changes = UserChanges {
        name: req.name,
        email: req.email,
        user_type: req.user_type.as_deref().map(parse_user_type).transpose()?,
        role: req.role.as_deref().map(parse_role).transpose()?,
    };
    let user = state.directory.update_user(user_id, changes).await?;
    Ok(Json(UserView::from(&user)))
}

/// Delete a staff member together with their participations and reminder history.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    responses(
        (status = 200, description = "User deleted", body = DeleteResponse),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "No such user")
    ),
    params(
        ("id" = Uuid, Path, description = "User id"),
        ("x-user-id" = Uuid, Header, description = "An administrator.")
    )
)]
pub async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    AdminActor(actor): AdminActor,
    Path(user_id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.directory.delete_user(user_id).await?;
    info!(%user_id, deleted_by = %actor.user_id, "User deleted via API");
    Ok(Json(DeleteResponse {
        success: true,
        message: "User deleted".to_string(),
    }))
}
