//! crates/roster_core/src/memory.rs
//!
//! An in-memory `RosterStore`. Transactions take an exclusive lock on the tables,
//! work on a copy, and write the copy back on commit. It backs the test suites and
//! local tooling; production runs against PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{Participation, ReminderKind, ReminderLog, TargetUserTypes, Training, User};
use crate::eligibility::is_eligible;
use crate::ports::{PortError, PortResult, RosterStore, RosterTransaction};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<Uuid, User>,
    trainings: BTreeMap<Uuid, Training>,
    participations: BTreeMap<Uuid, Participation>,
    reminders: Vec<ReminderLog>,
}

impl Tables {
    fn participations_where(&self, pred: impl Fn(&Participation) -> bool) -> Vec<Participation> {
        let mut rows: Vec<Participation> = self
            .participations
            .values()
            .filter(|p| pred(p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        rows
    }
}

/// Injected failures, used to exercise rollback and partial-failure paths.
#[derive(Debug, Default)]
struct Faults {
    fail_next_commit: AtomicBool,
    undeletable: StdMutex<HashSet<Uuid>>,
}

#[derive(Clone, Default)]
pub struct InMemoryRosterStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryRosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_training(&self, training: Training) {
        self.tables.lock().await.trainings.insert(training.id, training);
    }

    /// Stores a participation as-is, without any uniqueness check. This is how
    /// duplicate records get into the store in tests.
    pub async fn insert_participation(&self, participation: Participation) {
        self.tables
            .lock()
            .await
            .participations
            .insert(participation.id, participation);
    }

    pub async fn record_reminder(&self, log: ReminderLog) {
        self.tables.lock().await.reminders.push(log);
    }

    /// Makes the next `commit` fail; the transaction's changes are discarded.
    pub fn fail_next_commit(&self) {
        self.faults.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Makes every delete that includes `participation_id` fail.
    pub fn refuse_delete_of(&self, participation_id: Uuid) {
        if let Ok(mut ids) = self.faults.undeletable.lock() {
            ids.insert(participation_id);
        }
    }
}

#[async_trait]
impl RosterStore for InMemoryRosterStore {
    async fn begin(&self) -> PortResult<Box<dyn RosterTransaction>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn find_user(&self, user_id: Uuid) -> PortResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        Ok(self.tables.lock().await.users.values().cloned().collect())
    }

    async fn find_training(&self, training_id: Uuid) -> PortResult<Option<Training>> {
        Ok(self.tables.lock().await.trainings.get(&training_id).cloned())
    }

    async fn list_trainings(&self) -> PortResult<Vec<Training>> {
        let mut trainings: Vec<Training> =
            self.tables.lock().await.trainings.values().cloned().collect();
        trainings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(trainings)
    }

    async fn delete_training(&self, training_id: Uuid) -> PortResult<bool> {
        let mut tables = self.tables.lock().await;
        tables.participations.retain(|_, p| p.training_id != training_id);
        tables.reminders.retain(|r| r.training_id != training_id);
        Ok(tables.trainings.remove(&training_id).is_some())
    }

    async fn list_participations(&self) -> PortResult<Vec<Participation>> {
        Ok(self.tables.lock().await.participations_where(|_| true))
    }

    async fn participations_for_training(
        &self,
        training_id: Uuid,
    ) -> PortResult<Vec<Participation>> {
        Ok(self
            .tables
            .lock()
            .await
            .participations_where(|p| p.training_id == training_id))
    }

    async fn participations_for_user(&self, user_id: Uuid) -> PortResult<Vec<Participation>> {
        Ok(self
            .tables
            .lock()
            .await
            .participations_where(|p| p.user_id == user_id))
    }

    async fn last_reminder_at(
        &self,
        training_id: Uuid,
        user_id: Uuid,
        kind: ReminderKind,
    ) -> PortResult<Option<DateTime<Utc>>> {
        Ok(self
            .tables
            .lock()
            .await
            .reminders
            .iter()
            .filter(|r| r.training_id == training_id && r.user_id == user_id && r.kind == kind)
            .map(|r| r.sent_at)
            .max())
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Arc<Faults>,
}

#[async_trait]
impl RosterTransaction for InMemoryTransaction {
    async fn find_user(&mut self, user_id: Uuid) -> PortResult<Option<User>> {
        Ok(self.working.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> PortResult<Option<User>> {
        let email = email.to_lowercase();
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn insert_user(&mut self, user: &User) -> PortResult<()> {
        let email = user.email.to_lowercase();
        if self
            .working
            .users
            .values()
            .any(|u| u.email.to_lowercase() == email)
        {
            return Err(PortError::Validation(format!(
                "E-mail {} is already registered",
                user.email
            )));
        }
        self.working.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn save_user(&mut self, user: &User) -> PortResult<()> {
        let email = user.email.to_lowercase();
        if self
            .working
            .users
            .values()
            .any(|u| u.id != user.id && u.email.to_lowercase() == email)
        {
            return Err(PortError::Validation(format!(
                "E-mail {} is already registered",
                user.email
            )));
        }
        match self.working.users.get_mut(&user.id) {
            Some(row) => {
                *row = user.clone();
                Ok(())
            }
            None => Err(PortError::NotFound(format!("User {} not found", user.id))),
        }
    }

    async fn delete_user(&mut self, user_id: Uuid) -> PortResult<bool> {
        // Mirrors the ON DELETE CASCADE of the relational schema.
        self.working
            .participations
            .retain(|_, p| p.user_id != user_id);
        self.working.reminders.retain(|r| r.user_id != user_id);
        Ok(self.working.users.remove(&user_id).is_some())
    }

    async fn find_training(&mut self, training_id: Uuid) -> PortResult<Option<Training>> {
        Ok(self.working.trainings.get(&training_id).cloned())
    }

    async fn insert_training(&mut self, training: &Training) -> PortResult<()> {
        if self.working.trainings.contains_key(&training.id) {
            return Err(PortError::Store(format!("Training {} already exists", training.id)));
        }
        self.working.trainings.insert(training.id, training.clone());
        Ok(())
    }

    async fn save_training(&mut self, training: &Training) -> PortResult<()> {
        match self.working.trainings.get_mut(&training.id) {
            Some(row) => {
                *row = training.clone();
                Ok(())
            }
            None => Err(PortError::NotFound(format!("Training {} not found", training.id))),
        }
    }

    async fn find_users_by_types(&mut self, types: &TargetUserTypes) -> PortResult<Vec<User>> {
        Ok(self
            .working
            .users
            .values()
            .filter(|u| is_eligible(u, types))
            .cloned()
            .collect())
    }

    async fn find_participation(
        &mut self,
        participation_id: Uuid,
    ) -> PortResult<Option<Participation>> {
        Ok(self.working.participations.get(&participation_id).cloned())
    }

    async fn participations_for_training(
        &mut self,
        training_id: Uuid,
    ) -> PortResult<Vec<Participation>> {
        Ok(self
            .working
            .participations_where(|p| p.training_id == training_id))
    }

    async fn participations_for_pair(
        &mut self,
        training_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Vec<Participation>> {
        Ok(self
            .working
            .participations_where(|p| p.training_id == training_id && p.user_id == user_id))
    }

    async fn insert_participation(&mut self, participation: &Participation) -> PortResult<()> {
        if !self.working.trainings.contains_key(&participation.training_id) {
            return Err(PortError::Store(format!(
                "Training {} does not exist",
                participation.training_id
            )));
        }
        if !self.working.users.contains_key(&participation.user_id) {
            return Err(PortError::Store(format!(
                "User {} does not exist",
                participation.user_id
            )));
        }
        self.working
            .participations
            .insert(participation.id, participation.clone());
        Ok(())
    }

    async fn save_participation(&mut self, participation: &Participation) -> PortResult<()> {
        match self.working.participations.get_mut(&participation.id) {
            Some(row) => {
                *row = participation.clone();
                Ok(())
            }
            None => Err(PortError::NotFound(format!(
                "Participation {} not found",
                participation.id
            ))),
        }
    }

    async fn delete_participations(&mut self, ids: &[Uuid]) -> PortResult<u64> {
        let refused = self
            .faults
            .undeletable
            .lock()
            .map(|undeletable| ids.iter().any(|id| undeletable.contains(id)))
            .unwrap_or(false);
        if refused {
            return Err(PortError::Store("delete rejected by the store".to_string()));
        }
        let mut removed = 0;
        for id in ids {
            if self.working.participations.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        let InMemoryTransaction {
            mut guard,
            working,
            faults,
        } = *self;
        if faults.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(PortError::Store("commit failed".to_string()));
        }
        *guard = working;
        Ok(())
    }
}
