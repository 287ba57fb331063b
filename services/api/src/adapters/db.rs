//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `RosterStore` and `RosterTransaction` ports from the core crate. It handles all
//! interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use roster_core::domain::{
    Participation, ParticipationStatus, ReminderKind, Role, TargetUserTypes, Training,
    TrainingDetails, User, UserType,
};
use roster_core::ports::{PortError, PortResult, RosterStore, RosterTransaction};
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{FromRow, PgPool, Transaction};
use tracing::warn;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;

const USER_COLUMNS: &str = "id, email, name, user_type, role, must_set_pin";
const TRAINING_COLUMNS: &str = "id, name, description, deadline, target_users, manager, \
     department, method, method_link, hours, cycle, registration_book, implementation_date, \
     created_at, updated_at";
const PARTICIPATION_COLUMNS: &str =
    "id, training_id, user_id, status, completion_number, completed_at, created_at, updated_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `RosterStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool using the configured limits.
    pub async fn connect(config: &Config) -> Result<Self, ApiError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), ApiError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn store_error(e: sqlx::Error) -> PortError {
    PortError::Store(e.to_string())
}

/// Like `store_error`, but a clash on `users_email_lower_key` is the caller's fault.
fn user_write_error(e: sqlx::Error) -> PortError {
    let unique_clash = e
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if unique_clash {
        PortError::Validation("E-mail is already registered".to_string())
    } else {
        store_error(e)
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    name: String,
    user_type: Option<String>,
    role: String,
    must_set_pin: bool,
}
impl UserRecord {
    fn to_domain(self) -> User {
        let role = Role::parse(&self.role).unwrap_or_else(|| {
            warn!(user_id = %self.id, role = %self.role, "Unknown role; treating as USER");
            Role::User
        });
        User {
            id: self.id,
            email: self.email,
            name: self.name,
            user_type: self.user_type.as_deref().and_then(UserType::from_label),
            role,
            must_set_pin: self.must_set_pin,
        }
    }
}

#[derive(FromRow)]
struct TrainingRecord {
    id: Uuid,
    name: String,
    description: Option<String>,
    deadline: Option<NaiveDate>,
    target_users: Vec<String>,
    manager: String,
    department: Option<String>,
    method: Option<String>,
    method_link: Option<String>,
    hours: Option<String>,
    cycle: Option<String>,
    registration_book: Option<String>,
    implementation_date: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl TrainingRecord {
    fn to_domain(self) -> Training {
        let (target_user_types, unknown) = TargetUserTypes::parse_lenient(&self.target_users);
        if !unknown.is_empty() {
            warn!(training_id = %self.id, ?unknown, "Ignoring unknown target user types");
        }
        Training {
            id: self.id,
            name: self.name,
            description: self.description,
            deadline: self.deadline,
            target_user_types,
            details: TrainingDetails {
                manager: self.manager,
                department: self.department,
                method: self.method,
                method_link: self.method_link,
                hours: self.hours,
                cycle: self.cycle,
                registration_book: self.registration_book,
                implementation_date: self.implementation_date,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ParticipationRecord {
    id: Uuid,
    training_id: Uuid,
    user_id: Uuid,
    status: String,
    completion_number: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ParticipationRecord {
    fn to_domain(self) -> PortResult<Participation> {
        let status = ParticipationStatus::parse(&self.status).ok_or_else(|| {
            PortError::Store(format!(
                "Participation {} has unknown status '{}'",
                self.id, self.status
            ))
        })?;
        Ok(Participation {
            id: self.id,
            training_id: self.training_id,
            user_id: self.user_id,
            status,
            completion_number: self.completion_number,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn participations_to_domain(records: Vec<ParticipationRecord>) -> PortResult<Vec<Participation>> {
    records.into_iter().map(ParticipationRecord::to_domain).collect()
}

fn target_labels(training: &Training) -> Vec<String> {
    training
        .target_user_types
        .labels()
        .into_iter()
        .map(str::to_string)
        .collect()
}

//=========================================================================================
// `RosterStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RosterStore for DbAdapter {
    async fn begin(&self) -> PortResult<Box<dyn RosterTransaction>> {
        let tx = self.pool.begin().await.map_err(store_error)?;
        Ok(Box::new(DbTransaction { tx }))
    }

    async fn find_user(&self, user_id: Uuid) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(records.into_iter().map(UserRecord::to_domain).collect())
    }

    async fn find_training(&self, training_id: Uuid) -> PortResult<Option<Training>> {
        let record = sqlx::query_as::<_, TrainingRecord>(&format!(
            "SELECT {TRAINING_COLUMNS} FROM trainings WHERE id = $1"
        ))
        .bind(training_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(record.map(TrainingRecord::to_domain))
    }

    async fn list_trainings(&self) -> PortResult<Vec<Training>> {
        let records = sqlx::query_as::<_, TrainingRecord>(&format!(
            "SELECT {TRAINING_COLUMNS} FROM trainings ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(records.into_iter().map(TrainingRecord::to_domain).collect())
    }

    async fn delete_training(&self, training_id: Uuid) -> PortResult<bool> {
        // Participations and reminder logs go with it through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM trainings WHERE id = $1")
            .bind(training_id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_participations(&self) -> PortResult<Vec<Participation>> {
        let records = sqlx::query_as::<_, ParticipationRecord>(&format!(
            "SELECT {PARTICIPATION_COLUMNS} FROM training_participants ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        participations_to_domain(records)
    }

    async fn participations_for_training(
        &self,
        training_id: Uuid,
    ) -> PortResult<Vec<Participation>> {
        let records = sqlx::query_as::<_, ParticipationRecord>(&format!(
            "SELECT {PARTICIPATION_COLUMNS} FROM training_participants \
             WHERE training_id = $1 ORDER BY created_at ASC"
        ))
        .bind(training_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        participations_to_domain(records)
    }

    async fn participations_for_user(&self, user_id: Uuid) -> PortResult<Vec<Participation>> {
        let records = sqlx::query_as::<_, ParticipationRecord>(&format!(
            "SELECT {PARTICIPATION_COLUMNS} FROM training_participants \
             WHERE user_id = $1 ORDER BY created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        participations_to_domain(records)
    }

    async fn last_reminder_at(
        &self,
        training_id: Uuid,
        user_id: Uuid,
        kind: ReminderKind,
    ) -> PortResult<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT max(sent_at) FROM training_reminders \
             WHERE training_id = $1 AND user_id = $2 AND reminder_type = $3",
        )
        .bind(training_id)
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)
    }
}

//=========================================================================================
// `RosterTransaction` Trait Implementation
//=========================================================================================

/// A PostgreSQL transaction. sqlx rolls it back when dropped uncommitted.
pub struct DbTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl RosterTransaction for DbTransaction {
    async fn find_user(&mut self, user_id: Uuid) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn find_user_by_email(&mut self, email: &str) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn insert_user(&mut self, user: &User) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO users (id, email, name, user_type, role, must_set_pin) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.user_type.map(UserType::label))
        .bind(user.role.as_str())
        .bind(user.must_set_pin)
        .execute(&mut *self.tx)
        .await
        .map_err(user_write_error)?;
        Ok(())
    }

    async fn save_user(&mut self, user: &User) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE users SET email = $2, name = $3, user_type = $4, role = $5, \
             updated_at = now() WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.user_type.map(UserType::label))
        .bind(user.role.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(user_write_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user.id)));
        }
        Ok(())
    }

    async fn delete_user(&mut self, user_id: Uuid) -> PortResult<bool> {
        // Participations and reminder logs go with it through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_training(&mut self, training_id: Uuid) -> PortResult<Option<Training>> {
        // Row lock: concurrent edits of the same training queue up behind this one.
        let record = sqlx::query_as::<_, TrainingRecord>(&format!(
            "SELECT {TRAINING_COLUMNS} FROM trainings WHERE id = $1 FOR UPDATE"
        ))
        .bind(training_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(record.map(TrainingRecord::to_domain))
    }

    async fn insert_training(&mut self, training: &Training) -> PortResult<()> {
        let d = &training.details;
        sqlx::query(
            "INSERT INTO trainings (id, name, description, deadline, target_users, manager, \
             department, method, method_link, hours, cycle, registration_book, \
             implementation_date, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(training.id)
        .bind(&training.name)
        .bind(&training.description)
        .bind(training.deadline)
        .bind(target_labels(training))
        .bind(&d.manager)
        .bind(&d.department)
        .bind(&d.method)
        .bind(&d.method_link)
        .bind(&d.hours)
        .bind(&d.cycle)
        .bind(&d.registration_book)
        .bind(&d.implementation_date)
        .bind(training.created_at)
        .bind(training.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn save_training(&mut self, training: &Training) -> PortResult<()> {
        let d = &training.details;
        let result = sqlx::query(
            "UPDATE trainings SET name = $2, description = $3, deadline = $4, \
             target_users = $5, manager = $6, department = $7, method = $8, \
             method_link = $9, hours = $10, cycle = $11, registration_book = $12, \
             implementation_date = $13, updated_at = $14 WHERE id = $1",
        )
        .bind(training.id)
        .bind(&training.name)
        .bind(&training.description)
        .bind(training.deadline)
        .bind(target_labels(training))
        .bind(&d.manager)
        .bind(&d.department)
        .bind(&d.method)
        .bind(&d.method_link)
        .bind(&d.hours)
        .bind(&d.cycle)
        .bind(&d.registration_book)
        .bind(&d.implementation_date)
        .bind(training.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Training {} not found", training.id)));
        }
        Ok(())
    }

    async fn find_users_by_types(&mut self, types: &TargetUserTypes) -> PortResult<Vec<User>> {
        let labels: Vec<String> = types.labels().into_iter().map(str::to_string).collect();
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_type = ANY($1) ORDER BY name ASC"
        ))
        .bind(labels)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(records.into_iter().map(UserRecord::to_domain).collect())
    }

    async fn find_participation(
        &mut self,
        participation_id: Uuid,
    ) -> PortResult<Option<Participation>> {
        let record = sqlx::query_as::<_, ParticipationRecord>(&format!(
            "SELECT {PARTICIPATION_COLUMNS} FROM training_participants WHERE id = $1 FOR UPDATE"
        ))
        .bind(participation_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(store_error)?;
        record.map(ParticipationRecord::to_domain).transpose()
    }

    async fn participations_for_training(
        &mut self,
        training_id: Uuid,
    ) -> PortResult<Vec<Participation>> {
        let records = sqlx::query_as::<_, ParticipationRecord>(&format!(
            "SELECT {PARTICIPATION_COLUMNS} FROM training_participants \
             WHERE training_id = $1 ORDER BY created_at ASC FOR UPDATE"
        ))
        .bind(training_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(store_error)?;
        participations_to_domain(records)
    }

    async fn participations_for_pair(
        &mut self,
        training_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Vec<Participation>> {
        let records = sqlx::query_as::<_, ParticipationRecord>(&format!(
            "SELECT {PARTICIPATION_COLUMNS} FROM training_participants \
             WHERE training_id = $1 AND user_id = $2 ORDER BY created_at ASC FOR UPDATE"
        ))
        .bind(training_id)
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(store_error)?;
        participations_to_domain(records)
    }

    async fn insert_participation(&mut self, participation: &Participation) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO training_participants (id, training_id, user_id, status, \
             completion_number, completed_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(participation.id)
        .bind(participation.training_id)
        .bind(participation.user_id)
        .bind(participation.status.as_str())
        .bind(&participation.completion_number)
        .bind(participation.completed_at)
        .bind(participation.created_at)
        .bind(participation.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn save_participation(&mut self, participation: &Participation) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE training_participants SET status = $2, completion_number = $3, \
             completed_at = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(participation.id)
        .bind(participation.status.as_str())
        .bind(&participation.completion_number)
        .bind(participation.completed_at)
        .bind(participation.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Participation {} not found",
                participation.id
            )));
        }
        Ok(())
    }

    async fn delete_participations(&mut self, ids: &[Uuid]) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM training_participants WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        self.tx.commit().await.map_err(store_error)
    }
}
