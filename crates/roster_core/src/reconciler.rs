//! crates/roster_core/src/reconciler.rs
//!
//! Keeps the participations of a training consistent with its target user types.
//!
//! Every operation here runs inside one store transaction: the training row and its
//! roster are read, the difference is applied, and the result is committed together.
//! Records of users who stay eligible are never touched, so recorded completions
//! survive any number of re-matches.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{NewTraining, Participation, TargetUserTypes, Training, TrainingChanges};
use crate::eligibility::is_eligible;
use crate::ports::{PortError, PortResult, RosterStore, RosterTransaction};

/// What a reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Pending records created for newly eligible users.
    pub created: usize,
    /// Records deleted because their user is no longer targeted.
    pub removed: usize,
    /// Records left exactly as they were.
    pub retained: usize,
}

#[derive(Clone)]
pub struct RosterReconciler {
    store: Arc<dyn RosterStore>,
}

impl RosterReconciler {
    pub fn new(store: Arc<dyn RosterStore>) -> Self {
        Self { store }
    }

    /// Sets the target user types of a training and brings its roster in line.
    ///
    /// An empty `targets` set removes every participation of the training.
    pub async fn reconcile(
        &self,
        training_id: Uuid,
        targets: TargetUserTypes,
    ) -> PortResult<ReconcileOutcome> {
        let changes = TrainingChanges {
            target_user_types: Some(targets),
            ..TrainingChanges::default()
        };
        let (_, outcome) = self.update_training(training_id, changes).await?;
        Ok(outcome.unwrap_or_default())
    }

    /// Creates a training and enrolls every currently eligible user.
    pub async fn create_training(
        &self,
        new_training: NewTraining,
    ) -> PortResult<(Training, ReconcileOutcome)> {
        let manager = require_manager(&new_training.details.manager)?;
        if new_training.name.trim().is_empty() {
            return Err(PortError::Validation("Training name is required".to_string()));
        }

        let now = Utc::now();
        let mut details = new_training.details;
        details.manager = manager;
        let training = Training {
            id: Uuid::new_v4(),
            name: new_training.name,
            description: normalize_text(new_training.description),
            deadline: new_training.deadline,
            target_user_types: new_training.target_user_types,
            details,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        tx.insert_training(&training).await?;
        let outcome = apply_roster(tx.as_mut(), training.id, &training.target_user_types).await?;
        tx.commit().await?;

        info!(
            training_id = %training.id,
            enrolled = outcome.created,
            "Training created"
        );
        Ok((training, outcome))
    }

    /// Applies a partial edit. When the edit carries target user types the roster is
    /// re-matched in the same transaction; otherwise the outcome is `None`.
    pub async fn update_training(
        &self,
        training_id: Uuid,
        changes: TrainingChanges,
    ) -> PortResult<(Training, Option<ReconcileOutcome>)> {
        let mut tx = self.store.begin().await?;
        let mut training = tx
            .find_training(training_id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("Training {} not found", training_id)))?;

        let retarget = apply_changes(&mut training, changes)?;
        training.updated_at = Utc::now();
        tx.save_training(&training).await?;

        let outcome = if retarget {
            Some(apply_roster(tx.as_mut(), training_id, &training.target_user_types).await?)
        } else {
            None
        };
        tx.commit().await?;

        if let Some(o) = outcome {
            info!(
                %training_id,
                created = o.created,
                removed = o.removed,
                retained = o.retained,
                "Roster reconciled"
            );
        }
        Ok((training, outcome))
    }
}

/// Computes and applies the roster difference for one training inside `tx`.
async fn apply_roster(
    tx: &mut dyn RosterTransaction,
    training_id: Uuid,
    targets: &TargetUserTypes,
) -> PortResult<ReconcileOutcome> {
    let eligible = if targets.is_empty() {
        Vec::new()
    } else {
        tx.find_users_by_types(targets)
            .await?
            .into_iter()
            .filter(|u| is_eligible(u, targets))
            .collect()
    };
    let eligible_ids: HashSet<Uuid> = eligible.iter().map(|u| u.id).collect();

    let current = tx.participations_for_training(training_id).await?;
    let (kept, stale): (Vec<_>, Vec<_>) = current
        .into_iter()
        .partition(|p| eligible_ids.contains(&p.user_id));

    let stale_ids: Vec<Uuid> = stale.iter().map(|p| p.id).collect();
    if !stale_ids.is_empty() {
        tx.delete_participations(&stale_ids).await?;
    }

    let enrolled: HashSet<Uuid> = kept.iter().map(|p| p.user_id).collect();
    let now = Utc::now();
    let mut created = 0;
    for user in eligible.iter().filter(|u| !enrolled.contains(&u.id)) {
        tx.insert_participation(&Participation::pending(training_id, user.id, now))
            .await?;
        created += 1;
    }

    Ok(ReconcileOutcome {
        created,
        removed: stale_ids.len(),
        retained: kept.len(),
    })
}

/// Returns whether the target user types were part of the edit.
fn apply_changes(training: &mut Training, changes: TrainingChanges) -> PortResult<bool> {
    if let Some(name) = changes.name {
        if name.trim().is_empty() {
            return Err(PortError::Validation("Training name is required".to_string()));
        }
        training.name = name;
    }
    if let Some(manager) = changes.manager {
        training.details.manager = require_manager(&manager)?;
    }
    if let Some(description) = changes.description {
        training.description = normalize_text(description);
    }
    if let Some(deadline) = changes.deadline {
        training.deadline = deadline;
    }

    let details = &mut training.details;
    let optional_fields = [
        (changes.department, &mut details.department),
        (changes.method, &mut details.method),
        (changes.method_link, &mut details.method_link),
        (changes.hours, &mut details.hours),
        (changes.cycle, &mut details.cycle),
        (changes.registration_book, &mut details.registration_book),
        (changes.implementation_date, &mut details.implementation_date),
    ];
    for (change, field) in optional_fields {
        if let Some(value) = change {
            *field = value;
        }
    }

    match changes.target_user_types {
        Some(targets) => {
            training.target_user_types = targets;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn require_manager(manager: &str) -> PortResult<String> {
    let manager = manager.trim();
    if manager.is_empty() {
        return Err(PortError::Validation("A manager is required".to_string()));
    }
    Ok(manager.to_string())
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ParticipationStatus, Role, TrainingDetails, User, UserType};
    use crate::memory::InMemoryRosterStore;

    fn staff(name: &str, user_type: Option<UserType>) -> User {
        User {
            id: Uuid::new_v4(),
            email: format!("{}@school.kr", name.to_lowercase()),
            name: name.to_string(),
            user_type,
            role: Role::User,
            must_set_pin: false,
        }
    }

    fn new_training(targets: &[UserType]) -> NewTraining {
        NewTraining {
            name: "Child abuse prevention".to_string(),
            description: None,
            deadline: None,
            target_user_types: TargetUserTypes::new(targets.iter().copied()),
            details: TrainingDetails {
                manager: "Kim".to_string(),
                ..TrainingDetails::default()
            },
        }
    }

    async fn setup(users: &[User]) -> (InMemoryRosterStore, RosterReconciler) {
        let store = InMemoryRosterStore::new();
        for u in users {
            store.insert_user(u.clone()).await;
        }
        let reconciler = RosterReconciler::new(Arc::new(store.clone()));
        (store, reconciler)
    }

    async fn roster_user_ids(store: &InMemoryRosterStore, training_id: Uuid) -> HashSet<Uuid> {
        store
            .participations_for_training(training_id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.user_id)
            .collect()
    }

    async fn complete(store: &InMemoryRosterStore, training_id: Uuid, user_id: Uuid, number: &str) {
        let mut tx = store.begin().await.unwrap();
        let mut p = tx
            .participations_for_pair(training_id, user_id)
            .await
            .unwrap()
            .remove(0);
        p.status = ParticipationStatus::Completed;
        p.completion_number = Some(number.to_string());
        p.completed_at = Some(Utc::now());
        tx.save_participation(&p).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn widening_targets_preserves_completed_records() {
        let a = staff("A", Some(UserType::Teacher));
        let b = staff("B", Some(UserType::Staff));
        let (store, reconciler) = setup(&[a.clone(), b.clone()]).await;

        let (training, outcome) = reconciler
            .create_training(new_training(&[UserType::Teacher]))
            .await
            .unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(roster_user_ids(&store, training.id).await, HashSet::from([a.id]));

        complete(&store, training.id, a.id, "123").await;
        let before = store.participations_for_user(a.id).await.unwrap();

        let outcome = reconciler
            .reconcile(
                training.id,
                TargetUserTypes::new([UserType::Teacher, UserType::Staff]),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome {
                created: 1,
                removed: 0,
                retained: 1
            }
        );

        let after = store.participations_for_user(a.id).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(after[0].completion_number.as_deref(), Some("123"));

        let b_records = store.participations_for_user(b.id).await.unwrap();
        assert_eq!(b_records.len(), 1);
        assert_eq!(b_records[0].status, ParticipationStatus::Pending);
        assert_eq!(b_records[0].completion_number, None);
    }

    #[tokio::test]
    async fn roster_matches_exactly_the_targeted_users() {
        let users = [
            staff("A", Some(UserType::Teacher)),
            staff("B", Some(UserType::Staff)),
            staff("C", Some(UserType::CivilServiceWorker)),
            staff("D", None),
        ];
        let (store, reconciler) = setup(&users).await;
        let (training, _) = reconciler
            .create_training(new_training(&[UserType::Teacher, UserType::Staff]))
            .await
            .unwrap();

        reconciler
            .reconcile(
                training.id,
                TargetUserTypes::new([UserType::Staff, UserType::CivilServiceWorker]),
            )
            .await
            .unwrap();

        assert_eq!(
            roster_user_ids(&store, training.id).await,
            HashSet::from([users[1].id, users[2].id])
        );
        let saved = store.find_training(training.id).await.unwrap().unwrap();
        assert_eq!(saved.target_user_types.labels(), vec!["직원", "공무직"]);
    }

    #[tokio::test]
    async fn empty_targets_clear_the_roster() {
        let a = staff("A", Some(UserType::Teacher));
        let (store, reconciler) = setup(&[a.clone()]).await;
        let (training, _) = reconciler
            .create_training(new_training(&[UserType::Teacher]))
            .await
            .unwrap();
        complete(&store, training.id, a.id, "9").await;

        let outcome = reconciler
            .reconcile(training.id, TargetUserTypes::default())
            .await
            .unwrap();

        assert_eq!(outcome.removed, 1);
        assert!(store
            .participations_for_training(training.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn reconciling_twice_changes_nothing_the_second_time() {
        let users = [
            staff("A", Some(UserType::Teacher)),
            staff("B", Some(UserType::Staff)),
        ];
        let (store, reconciler) = setup(&users).await;
        let (training, _) = reconciler
            .create_training(new_training(&[]))
            .await
            .unwrap();
        let targets = TargetUserTypes::new([UserType::Teacher, UserType::Staff]);

        reconciler.reconcile(training.id, targets.clone()).await.unwrap();
        let first = store.participations_for_training(training.id).await.unwrap();

        let outcome = reconciler.reconcile(training.id, targets).await.unwrap();
        let second = store.participations_for_training(training.id).await.unwrap();

        assert_eq!(outcome.created + outcome.removed, 0);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unknown_training_is_not_found() {
        let (_, reconciler) = setup(&[]).await;
        let err = reconciler
            .reconcile(Uuid::new_v4(), TargetUserTypes::new([UserType::Teacher]))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_commit_leaves_the_roster_untouched() {
        let a = staff("A", Some(UserType::Teacher));
        let b = staff("B", Some(UserType::Staff));
        let (store, reconciler) = setup(&[a, b]).await;
        let (training, _) = reconciler
            .create_training(new_training(&[UserType::Teacher]))
            .await
            .unwrap();
        let before = store.participations_for_training(training.id).await.unwrap();

        store.fail_next_commit();
        let err = reconciler
            .reconcile(training.id, TargetUserTypes::new([UserType::Staff]))
            .await
            .unwrap_err();

        assert!(matches!(err, PortError::Store(_)));
        assert_eq!(
            store.participations_for_training(training.id).await.unwrap(),
            before
        );
        let saved = store.find_training(training.id).await.unwrap().unwrap();
        assert_eq!(saved.target_user_types.labels(), vec!["교원"]);
    }

    #[tokio::test]
    async fn metadata_edit_does_not_touch_the_roster() {
        let a = staff("A", Some(UserType::Teacher));
        let (store, reconciler) = setup(&[a]).await;
        let (training, _) = reconciler
            .create_training(new_training(&[UserType::Teacher]))
            .await
            .unwrap();
        let before = store.participations_for_training(training.id).await.unwrap();

        let (updated, outcome) = reconciler
            .update_training(
                training.id,
                TrainingChanges {
                    manager: Some("  Lee ".to_string()),
                    description: Some(Some("   ".to_string())),
                    ..TrainingChanges::default()
                },
            )
            .await
            .unwrap();

        assert!(outcome.is_none());
        assert_eq!(updated.details.manager, "Lee");
        assert_eq!(updated.description, None);
        assert_eq!(
            store.participations_for_training(training.id).await.unwrap(),
            before
        );
    }

    #[tokio::test]
    async fn blank_manager_is_rejected() {
        let (_, reconciler) = setup(&[]).await;
        let mut input = new_training(&[]);
        input.details.manager = "  ".to_string();
        let err = reconciler.create_training(input).await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }
}
