//! crates/roster_core/src/ports.rs
//!
//! Defines the store contracts (traits) for the roster core.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete relational store behind it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Participation, ReminderKind, TargetUserTypes, Training, User};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port and engine operations.
/// This abstracts away the specific errors from the underlying store.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// A transaction or commit failure. Nothing was persisted; callers may retry.
    #[error("Store error: {0}")]
    Store(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Store Ports (Traits)
//=========================================================================================

/// Handle to the roster store. Reads outside a transaction see committed state only.
#[async_trait]
pub trait RosterStore: Send + Sync {
    /// Opens a transaction. Dropping it without calling `commit` rolls it back.
    async fn begin(&self) -> PortResult<Box<dyn RosterTransaction>>;

    // --- Users ---
    async fn find_user(&self, user_id: Uuid) -> PortResult<Option<User>>;

    async fn list_users(&self) -> PortResult<Vec<User>>;

    // --- Trainings ---
    async fn find_training(&self, training_id: Uuid) -> PortResult<Option<Training>>;

    /// Trainings, newest first.
    async fn list_trainings(&self) -> PortResult<Vec<Training>>;

    /// Deletes a training together with its participations and reminder logs.
    /// Returns `false` when no such training existed.
    async fn delete_training(&self, training_id: Uuid) -> PortResult<bool>;

    // --- Participations ---
    async fn list_participations(&self) -> PortResult<Vec<Participation>>;

    async fn participations_for_training(&self, training_id: Uuid)
        -> PortResult<Vec<Participation>>;

    async fn participations_for_user(&self, user_id: Uuid) -> PortResult<Vec<Participation>>;

    // --- Reminder Log (read-only) ---
    /// When a reminder of `kind` was last logged for the pair, if ever.
    async fn last_reminder_at(
        &self,
        training_id: Uuid,
        user_id: Uuid,
        kind: ReminderKind,
    ) -> PortResult<Option<DateTime<Utc>>>;
}

/// A unit of work against the roster store. Every change becomes visible at
/// `commit` or not at all.
#[async_trait]
pub trait RosterTransaction: Send {
    // --- Users ---
    async fn find_user(&mut self, user_id: Uuid) -> PortResult<Option<User>>;

    /// Case-insensitive lookup.
    async fn find_user_by_email(&mut self, email: &str) -> PortResult<Option<User>>;

    /// Fails with `Validation` when the e-mail is already registered.
    async fn insert_user(&mut self, user: &User) -> PortResult<()>;

    /// Overwrites name, e-mail, user type and role of an existing user.
    async fn save_user(&mut self, user: &User) -> PortResult<()>;

    /// Deletes a user together with its participations and reminder logs.
    /// Returns `false` when no such user existed.
    async fn delete_user(&mut self, user_id: Uuid) -> PortResult<bool>;

    // --- Trainings ---
    async fn find_training(&mut self, training_id: Uuid) -> PortResult<Option<Training>>;

    async fn insert_training(&mut self, training: &Training) -> PortResult<()>;

    /// Overwrites every column of an existing training.
    async fn save_training(&mut self, training: &Training) -> PortResult<()>;

    /// Users whose stored category is one of `types`.
    async fn find_users_by_types(&mut self, types: &TargetUserTypes) -> PortResult<Vec<User>>;

    async fn find_participation(&mut self, participation_id: Uuid)
        -> PortResult<Option<Participation>>;

    async fn participations_for_training(&mut self, training_id: Uuid)
        -> PortResult<Vec<Participation>>;

    /// Every record carrying the (training, user) key. More than one means duplicates.
    async fn participations_for_pair(
        &mut self,
        training_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Vec<Participation>>;

    async fn insert_participation(&mut self, participation: &Participation) -> PortResult<()>;

    /// Overwrites status, completion number and timestamps of an existing record.
    async fn save_participation(&mut self, participation: &Participation) -> PortResult<()>;

    /// Returns the number of rows removed.
    async fn delete_participations(&mut self, ids: &[Uuid]) -> PortResult<u64>;

    async fn commit(self: Box<Self>) -> PortResult<()>;
}
