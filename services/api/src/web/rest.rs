//! services/api/src/web/rest.rs
//!
//! Contains the JSON payloads exchanged by the REST API, the conversions from the
//! core domain types into them, and the master definition for the OpenAPI
//! specification.

use axum::{response::IntoResponse, Json};
use chrono::{DateTime, NaiveDate, Utc};
use roster_core::domain::{Participation, Training, User};
use roster_core::{CompletionSummary, DueReminder, ReconcileOutcome, ResolutionReport};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::web::{participants, reminders, trainings, users};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        trainings::list_trainings_handler,
        trainings::create_training_handler,
        trainings::get_training_handler,
        trainings::update_training_handler,
        trainings::delete_training_handler,
        trainings::training_stats_handler,
        trainings::user_stats_handler,
        trainings::incomplete_list_handler,
        users::list_users_handler,
        users::create_user_handler,
        users::update_user_handler,
        users::delete_user_handler,
        participants::list_training_participants_handler,
        participants::my_trainings_handler,
        participants::update_completion_number_handler,
        participants::cleanup_duplicates_handler,
        reminders::due_reminders_handler,
    ),
    components(
        schemas(
            CreateTrainingRequest, UpdateTrainingRequest, CompletionNumberRequest,
            CreateUserRequest, UpdateUserRequest, UserView,
            TrainingView, TrainingSummary, UserSummary, ParticipationView,
            TrainingWriteResponse, ReconcileSummary, DeleteResponse,
            TrainingStatsResponse, UserStatsResponse, CleanupResponse, DueReminderView,
        )
    ),
    tags(
        (name = "Training Roster API", description = "Mandatory staff training enrollment and completion tracking.")
    )
)]
pub struct ApiDoc;

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

//=========================================================================================
// Request Payloads
//=========================================================================================

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTrainingRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub manager: String,
    /// Staff category labels, e.g. "교원". Unknown labels are ignored.
    #[serde(default)]
    pub target_users: Vec<String>,
    pub deadline: Option<NaiveDate>,
    pub department: Option<String>,
    pub method: Option<String>,
    pub method_link: Option<String>,
    pub hours: Option<String>,
    pub cycle: Option<String>,
    pub registration_book: Option<String>,
    pub implementation_date: Option<String>,
}

/// A partial edit. Omitted fields stay as they are; `null` clears optional ones.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTrainingRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub manager: Option<String>,
    /// When present the roster is re-matched against these categories.
    pub target_users: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = Date)]
    pub deadline: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub department: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub method: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub method_link: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub hours: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub cycle: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub registration_book: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub implementation_date: Option<Option<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionNumberRequest {
    pub completion_number: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    /// Staff category label; defaults to "교직원".
    pub user_type: Option<String>,
    /// `SUPER_ADMIN`, `TRAINING_ADMIN` or `USER` (the default).
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub user_type: Option<String>,
    pub role: Option<String>,
}

//=========================================================================================
// Response Payloads
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub user_type: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            user_type: user.user_type.map(|t| t.label().to_string()),
        }
    }
}

/// The full account record shown to administrators.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub user_type: Option<String>,
    pub role: String,
    pub must_set_pin: bool,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            user_type: user.user_type.map(|t| t.label().to_string()),
            role: user.role.as_str().to_string(),
            must_set_pin: user.must_set_pin,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSummary {
    pub id: Uuid,
    pub name: String,
    pub deadline: Option<NaiveDate>,
    pub manager: String,
    pub department: Option<String>,
}

impl From<&Training> for TrainingSummary {
    fn from(training: &Training) -> Self {
        Self {
            id: training.id,
            name: training.name.clone(),
            deadline: training.deadline,
            manager: training.details.manager.clone(),
            department: training.details.department.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationView {
    pub id: Uuid,
    pub training_id: Uuid,
    pub user_id: Uuid,
    /// `pending` or `completed`.
    pub status: String,
    pub completion_number: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training: Option<TrainingSummary>,
}

impl From<&Participation> for ParticipationView {
    fn from(p: &Participation) -> Self {
        Self {
            id: p.id,
            training_id: p.training_id,
            user_id: p.user_id,
            status: p.status.as_str().to_string(),
            completion_number: p.completion_number.clone(),
            completed_at: p.completed_at,
            created_at: p.created_at,
            updated_at: p.updated_at,
            user: None,
            training: None,
        }
    }
}

impl ParticipationView {
    pub fn with_user(mut self, users: &HashMap<Uuid, User>) -> Self {
        self.user = users.get(&self.user_id).map(UserSummary::from);
        self
    }

    pub fn with_training(mut self, training: Option<&Training>) -> Self {
        self.training = training.map(TrainingSummary::from);
        self
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainingView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub target_users: Vec<String>,
    pub manager: String,
    pub department: Option<String>,
    pub method: Option<String>,
    pub method_link: Option<String>,
    pub hours: Option<String>,
    pub cycle: Option<String>,
    pub registration_book: Option<String>,
    pub implementation_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub participants: Vec<ParticipationView>,
}

impl TrainingView {
    pub fn new(training: &Training, participants: Vec<ParticipationView>) -> Self {
        let d = &training.details;
        Self {
            id: training.id,
            name: training.name.clone(),
            description: training.description.clone(),
            deadline: training.deadline,
            target_users: training
                .target_user_types
                .labels()
                .into_iter()
                .map(str::to_string)
                .collect(),
            manager: d.manager.clone(),
            department: d.department.clone(),
            method: d.method.clone(),
            method_link: d.method_link.clone(),
            hours: d.hours.clone(),
            cycle: d.cycle.clone(),
            registration_book: d.registration_book.clone(),
            implementation_date: d.implementation_date.clone(),
            created_at: training.created_at,
            updated_at: training.updated_at,
            participants,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub created: usize,
    pub removed: usize,
    pub retained: usize,
}

impl From<ReconcileOutcome> for ReconcileSummary {
    fn from(o: ReconcileOutcome) -> Self {
        Self {
            created: o.created,
            removed: o.removed,
            retained: o.retained,
        }
    }
}

/// Returned by create and update: the training with its roster, plus what the
/// roster matching did.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainingWriteResponse {
    pub training: TrainingView,
    pub reconciliation: Option<ReconcileSummary>,
    /// Target labels that were not recognised and therefore ignored.
    pub ignored_target_users: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStatsResponse {
    pub training: TrainingSummary,
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub completion_rate: f64,
    pub participants: Vec<ParticipationView>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStatsResponse {
    pub user: UserSummary,
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub completion_rate: f64,
    pub trainings: Vec<ParticipationView>,
}

impl TrainingStatsResponse {
    pub fn new(
        training: &Training,
        summary: CompletionSummary,
        participants: Vec<ParticipationView>,
    ) -> Self {
        Self {
            training: TrainingSummary::from(training),
            total: summary.total,
            completed: summary.completed,
            pending: summary.pending,
            completion_rate: summary.completion_rate,
            participants,
        }
    }
}

impl UserStatsResponse {
    pub fn new(user: &User, summary: CompletionSummary, trainings: Vec<ParticipationView>) -> Self {
        Self {
            user: UserSummary::from(user),
            total: summary.total,
            completed: summary.completed,
            pending: summary.pending,
            completion_rate: summary.completion_rate,
            trainings,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub success: bool,
    pub message: String,
    pub groups_found: usize,
    pub groups_resolved: usize,
    pub groups_failed: usize,
    pub deleted_count: u64,
}

impl From<ResolutionReport> for CleanupResponse {
    fn from(r: ResolutionReport) -> Self {
        let message = if r.groups_found == 0 {
            "No duplicate records found.".to_string()
        } else {
            format!(
                "Resolved {} of {} duplicate groups; {} records deleted.",
                r.groups_resolved, r.groups_found, r.records_deleted
            )
        };
        Self {
            success: r.groups_failed == 0,
            message,
            groups_found: r.groups_found,
            groups_resolved: r.groups_resolved,
            groups_failed: r.groups_failed,
            deleted_count: r.records_deleted,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DueReminderView {
    pub training_id: Uuid,
    pub training_name: String,
    pub deadline: NaiveDate,
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    /// `3months`, `1month` or `missing`.
    pub reminder_type: String,
}

impl From<DueReminder> for DueReminderView {
    fn from(r: DueReminder) -> Self {
        Self {
            training_id: r.training_id,
            training_name: r.training_name,
            deadline: r.deadline,
            user_id: r.user_id,
            user_name: r.user_name,
            user_email: r.user_email,
            reminder_type: r.kind.as_str().to_string(),
        }
    }
}
