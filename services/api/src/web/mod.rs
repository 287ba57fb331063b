pub mod middleware;
pub mod participants;
pub mod reminders;
pub mod rest;
pub mod state;
pub mod trainings;
pub mod users;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use middleware::require_auth;
pub use state::AppState;

/// Builds the REST router. `/health` is public; everything else requires `x-user-id`.
pub fn app_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route("/health", get(rest::health_handler));

    let protected_routes = Router::new()
        .route(
            "/trainings",
            get(trainings::list_trainings_handler).post(trainings::create_training_handler),
        )
        .route(
            "/trainings/{id}",
            get(trainings::get_training_handler)
                .put(trainings::update_training_handler)
                .delete(trainings::delete_training_handler),
        )
        .route("/trainings/{id}/stats", get(trainings::training_stats_handler))
        .route("/users/{id}/stats", get(trainings::user_stats_handler))
        .route("/stats/incomplete", get(trainings::incomplete_list_handler))
        .route(
            "/users",
            get(users::list_users_handler).post(users::create_user_handler),
        )
        .route(
            "/users/{id}",
            put(users::update_user_handler).delete(users::delete_user_handler),
        )
        .route(
            "/participants/training/{training_id}",
            get(participants::list_training_participants_handler),
        )
        .route(
            "/participants/my-trainings",
            get(participants::my_trainings_handler),
        )
        .route(
            "/participants/{id}/completion-number",
            put(participants::update_completion_number_handler),
        )
        .route(
            "/participants/cleanup-duplicates",
            post(participants::cleanup_duplicates_handler),
        )
        .route("/reminders/due", get(reminders::due_reminders_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
