//! crates/roster_core/src/completion.rs
//!
//! Self-reported completion of a training.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Actor, Participation, ParticipationStatus};
use crate::ports::{PortError, PortResult, RosterStore};

#[derive(Clone)]
pub struct CompletionRecorder {
    store: Arc<dyn RosterStore>,
}

impl CompletionRecorder {
    pub fn new(store: Arc<dyn RosterStore>) -> Self {
        Self { store }
    }

    /// Marks a participation completed with the given completion number.
    ///
    /// Only the participant themself or an admin may do this. Re-submitting replaces
    /// the number and the completion time.
    pub async fn record(
        &self,
        actor: &Actor,
        participation_id: Uuid,
        completion_number: &str,
    ) -> PortResult<Participation> {
        let number = completion_number.trim();
        if number.is_empty() {
            return Err(PortError::Validation(
                "A completion number is required".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let mut participation = tx.find_participation(participation_id).await?.ok_or_else(|| {
            PortError::NotFound(format!("Participation {} not found", participation_id))
        })?;

        if !actor.may_act_for(participation.user_id) {
            return Err(PortError::Forbidden(
                "Only your own completion number can be recorded".to_string(),
            ));
        }

        let now = Utc::now();
        participation.completion_number = Some(number.to_string());
        participation.status = ParticipationStatus::Completed;
        participation.completed_at = Some(now);
        participation.updated_at = now;
        tx.save_participation(&participation).await?;
        tx.commit().await?;

        info!(
            %participation_id,
            recorded_by = %actor.user_id,
            "Completion recorded"
        );
        Ok(participation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Role, TargetUserTypes, Training, TrainingDetails, User, UserType,
    };
    use crate::memory::InMemoryRosterStore;

    async fn enrolled() -> (InMemoryRosterStore, CompletionRecorder, Participation) {
        let store = InMemoryRosterStore::new();
        let user = User {
            id: Uuid::new_v4(),
            email: "a@school.kr".into(),
            name: "A".into(),
            user_type: Some(UserType::Teacher),
            role: Role::User,
            must_set_pin: false,
        };
        let now = Utc::now();
        let training = Training {
            id: Uuid::new_v4(),
            name: "Safety".into(),
            description: None,
            deadline: None,
            target_user_types: TargetUserTypes::new([UserType::Teacher]),
            details: TrainingDetails {
                manager: "Kim".into(),
                ..TrainingDetails::default()
            },
            created_at: now,
            updated_at: now,
        };
        let participation = Participation::pending(training.id, user.id, now);
        store.insert_user(user).await;
        store.insert_training(training).await;
        store.insert_participation(participation.clone()).await;
        let recorder = CompletionRecorder::new(Arc::new(store.clone()));
        (store, recorder, participation)
    }

    #[tokio::test]
    async fn participant_records_own_completion() {
        let (store, recorder, p) = enrolled().await;
        let actor = Actor {
            user_id: p.user_id,
            role: Role::User,
        };

        let updated = recorder.record(&actor, p.id, " 2025-001 ").await.unwrap();

        assert_eq!(updated.status, ParticipationStatus::Completed);
        assert_eq!(updated.completion_number.as_deref(), Some("2025-001"));
        assert!(updated.completed_at.is_some());
        let stored = store.participations_for_user(p.user_id).await.unwrap();
        assert_eq!(stored, vec![updated]);
    }

    #[tokio::test]
    async fn other_users_are_forbidden_but_admins_are_not() {
        let (_, recorder, p) = enrolled().await;
        let stranger = Actor {
            user_id: Uuid::new_v4(),
            role: Role::User,
        };
        let admin = Actor {
            user_id: Uuid::new_v4(),
            role: Role::TrainingAdmin,
        };

        let err = recorder.record(&stranger, p.id, "1").await.unwrap_err();
        assert!(matches!(err, PortError::Forbidden(_)));
        assert!(recorder.record(&admin, p.id, "1").await.is_ok());
    }

    #[tokio::test]
    async fn blank_number_and_unknown_record_are_rejected() {
        let (_, recorder, p) = enrolled().await;
        let actor = Actor {
            user_id: p.user_id,
            role: Role::User,
        };

        assert!(matches!(
            recorder.record(&actor, p.id, "   ").await,
            Err(PortError::Validation(_))
        ));
        assert!(matches!(
            recorder.record(&actor, Uuid::new_v4(), "1").await,
            Err(PortError::NotFound(_))
        ));
    }
}
