//! crates/roster_core/src/domain.rs
//!
//! Defines the pure, core data structures for the training roster.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

//=========================================================================================
// Staff Categories and Roles
//=========================================================================================

/// The closed set of staff categories a training can target.
///
/// Values are compared by exact match of their stored label. No case folding or
/// whitespace normalisation happens beyond what the store already applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UserType {
    Teacher,
    Staff,
    CivilServiceWorker,
    FixedTermTeacher,
    EducationServiceWorker,
    SchoolPersonnel,
    EducationVolunteer,
}

impl UserType {
    pub const ALL: [UserType; 7] = [
        UserType::Teacher,
        UserType::Staff,
        UserType::CivilServiceWorker,
        UserType::FixedTermTeacher,
        UserType::EducationServiceWorker,
        UserType::SchoolPersonnel,
        UserType::EducationVolunteer,
    ];

    /// The label stored in the database and exchanged with clients.
    pub fn label(self) -> &'static str {
        match self {
            UserType::Teacher => "교원",
            UserType::Staff => "직원",
            UserType::CivilServiceWorker => "공무직",
            UserType::FixedTermTeacher => "기간제교사",
            UserType::EducationServiceWorker => "교육공무직",
            UserType::SchoolPersonnel => "교직원",
            UserType::EducationVolunteer => "교육활동 참여자",
        }
    }

    /// Returns `None` for any label outside the enumeration, including the empty string.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label)
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Application role. This is the only place the role of a person is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    SuperAdmin,
    TrainingAdmin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::TrainingAdmin => "TRAINING_ADMIN",
            Role::User => "USER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SUPER_ADMIN" => Some(Role::SuperAdmin),
            "TRAINING_ADMIN" => Some(Role::TrainingAdmin),
            "USER" => Some(Role::User),
            _ => None,
        }
    }

    /// Whether this role may manage trainings and run roster maintenance.
    pub fn is_admin(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::TrainingAdmin)
    }
}

//=========================================================================================
// Target User Types
//=========================================================================================

/// The eligibility filter of a training. An empty set targets no one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetUserTypes(BTreeSet<UserType>);

impl TargetUserTypes {
    pub fn new(types: impl IntoIterator<Item = UserType>) -> Self {
        Self(types.into_iter().collect())
    }

    /// Builds a target set from raw labels, returning the labels that were not
    /// recognised alongside it instead of failing.
    pub fn parse_lenient<I, S>(labels: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut types = BTreeSet::new();
        let mut rejected = Vec::new();
        for label in labels {
            let label = label.as_ref();
            match UserType::from_label(label) {
                Some(t) => {
                    types.insert(t);
                }
                None => rejected.push(label.to_string()),
            }
        }
        (Self(types), rejected)
    }

    pub fn contains(&self, user_type: UserType) -> bool {
        self.0.contains(&user_type)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = UserType> + '_ {
        self.0.iter().copied()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.iter().map(UserType::label).collect()
    }
}

//=========================================================================================
// Users
//=========================================================================================

// Represents a staff member - authentication material lives outside the core.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    /// `None` when the stored category is missing or not one of the known labels.
    pub user_type: Option<UserType>,
    pub role: Role,
    pub must_set_pin: bool,
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn may_act_for(&self, user_id: Uuid) -> bool {
        self.role.is_admin() || self.user_id == user_id
    }
}

/// Input for registering a staff member. New accounts must set a PIN on first login.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub user_type: UserType,
    pub role: Role,
}

/// A partial edit of a staff member. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub user_type: Option<UserType>,
    pub role: Option<Role>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.user_type.is_none() && self.role.is_none()
    }
}

//=========================================================================================
// Trainings
//=========================================================================================

/// Descriptive metadata of a training. None of it affects the roster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingDetails {
    pub manager: String,
    pub department: Option<String>,
    pub method: Option<String>,
    pub method_link: Option<String>,
    pub hours: Option<String>,
    pub cycle: Option<String>,
    pub registration_book: Option<String>,
    pub implementation_date: Option<String>,
}

/// A mandatory training program.
#[derive(Debug, Clone, PartialEq)]
pub struct Training {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub target_user_types: TargetUserTypes,
    pub details: TrainingDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a training.
#[derive(Debug, Clone)]
pub struct NewTraining {
    pub name: String,
    pub description: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub target_user_types: TargetUserTypes,
    pub details: TrainingDetails,
}

/// A partial edit of a training. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TrainingChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub deadline: Option<Option<NaiveDate>>,
    pub target_user_types: Option<TargetUserTypes>,
    pub manager: Option<String>,
    pub department: Option<Option<String>>,
    pub method: Option<Option<String>>,
    pub method_link: Option<Option<String>>,
    pub hours: Option<Option<String>>,
    pub cycle: Option<Option<String>>,
    pub registration_book: Option<Option<String>>,
    pub implementation_date: Option<Option<String>>,
}

//=========================================================================================
// Participations
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticipationStatus {
    Pending,
    Completed,
}

impl ParticipationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ParticipationStatus::Pending => "pending",
            ParticipationStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ParticipationStatus::Pending),
            "completed" => Some(ParticipationStatus::Completed),
            _ => None,
        }
    }
}

/// The enrollment and completion record of one user in one training.
#[derive(Debug, Clone, PartialEq)]
pub struct Participation {
    pub id: Uuid,
    pub training_id: Uuid,
    pub user_id: Uuid,
    pub status: ParticipationStatus,
    pub completion_number: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Participation {
    /// A fresh, pending enrollment.
    pub fn pending(training_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            training_id,
            user_id,
            status: ParticipationStatus::Pending,
            completion_number: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_completion_number(&self) -> bool {
        self.completion_number
            .as_deref()
            .is_some_and(|n| !n.trim().is_empty())
    }

    pub fn is_completed(&self) -> bool {
        self.status == ParticipationStatus::Completed
    }
}

//=========================================================================================
// Reminder Log
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderKind {
    ThreeMonths,
    OneMonth,
    MissingCompletion,
}

impl ReminderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderKind::ThreeMonths => "3months",
            ReminderKind::OneMonth => "1month",
            ReminderKind::MissingCompletion => "missing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "3months" => Some(ReminderKind::ThreeMonths),
            "1month" => Some(ReminderKind::OneMonth),
            "missing" => Some(ReminderKind::MissingCompletion),
            _ => None,
        }
    }
}

/// A reminder the external mailer logged. Delivery status and row ids belong to the
/// mailer; the planner only asks whether and when a kind was logged for a pair.
#[derive(Debug, Clone)]
pub struct ReminderLog {
    pub training_id: Uuid,
    pub user_id: Uuid,
    pub kind: ReminderKind,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_parse_keeps_known_labels_and_reports_the_rest() {
        let (targets, rejected) =
            TargetUserTypes::parse_lenient(["교원", "teacher", "", "직원", "교원"]);

        assert_eq!(targets.labels(), vec!["교원", "직원"]);
        assert_eq!(rejected, vec!["teacher".to_string(), String::new()]);
    }

    #[test]
    fn user_type_labels_round_trip() {
        for t in UserType::ALL {
            assert_eq!(UserType::from_label(t.label()), Some(t));
        }
        assert_eq!(UserType::from_label(" 교원"), None);
    }

    #[test]
    fn only_admin_roles_administer() {
        assert!(Role::SuperAdmin.is_admin());
        assert!(Role::TrainingAdmin.is_admin());
        assert!(!Role::User.is_admin());
        assert_eq!(Role::parse("TRAINING_ADMIN"), Some(Role::TrainingAdmin));
        assert_eq!(Role::parse("admin"), None);
    }

    #[test]
    fn blank_completion_number_does_not_count() {
        let mut p = Participation::pending(Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        assert!(!p.has_completion_number());
        p.completion_number = Some("   ".into());
        assert!(!p.has_completion_number());
        p.completion_number = Some("A-1".into());
        assert!(p.has_completion_number());
    }
}
