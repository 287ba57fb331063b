//! services/api/src/web/middleware.rs
//!
//! Caller identification for protected routes.
//!
//! Credential checks (PIN login, tokens) happen in front of this service. By the time
//! a request arrives here it carries the authenticated user's id in `x-user-id`; this
//! layer resolves that id to an [`Actor`] with the role stored for the user.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use roster_core::domain::Actor;
use roster_core::ports::PortError;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Resolves the caller and inserts the `Actor` into request extensions.
///
/// Missing, malformed, or unknown ids are rejected with 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract the caller id header
    let raw = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("x-user-id header is required".to_string()))?;

    // 2. Parse it
    let user_id = Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::Unauthorized("Invalid x-user-id format".to_string()))?;

    // 3. Look the user up to learn their role
    let user = state
        .store
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Unknown user".to_string()))?;

    // 4. Insert the actor into request extensions
    req.extensions_mut().insert(Actor {
        user_id: user.id,
        role: user.role,
    });

    Ok(next.run(req).await)
}

/// Extractor for handlers restricted to administrators. Requires `require_auth`
/// to have run first.
#[derive(Debug, Clone, Copy)]
pub struct AdminActor(pub Actor);

impl<S> FromRequestParts<S> for AdminActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .extensions
            .get::<Actor>()
            .copied()
            .ok_or_else(|| ApiError::Unauthorized("Authentication is required".to_string()))?;
        if !actor.role.is_admin() {
            return Err(PortError::Forbidden(
                "Administrator privileges are required".to_string(),
            )
            .into());
        }
        Ok(AdminActor(actor))
    }
}
