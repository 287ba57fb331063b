//! crates/roster_core/src/directory.rs
//!
//! Staff registration and maintenance. E-mails are stored trimmed and lower-cased
//! and are unique regardless of case.

use regex::Regex;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{NewUser, User, UserChanges};
use crate::ports::{PortError, PortResult, RosterStore};

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn RosterStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn RosterStore>) -> Self {
        Self { store }
    }

    /// Registers a staff member. The account starts with `must_set_pin` set.
    pub async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let name = require_name(&new_user.name)?;
        let email = normalize_email(&new_user.email)?;

        let mut tx = self.store.begin().await?;
        if tx.find_user_by_email(&email).await?.is_some() {
            return Err(PortError::Validation(format!(
                "E-mail {} is already registered",
                email
            )));
        }
        let user = User {
            id: Uuid::new_v4(),
            email,
            name,
            user_type: Some(new_user.user_type),
            role: new_user.role,
            must_set_pin: true,
        };
        tx.insert_user(&user).await?;
        tx.commit().await?;

        info!(user_id = %user.id, role = user.role.as_str(), "User registered");
        Ok(user)
    }

    /// Applies a partial edit. Rosters are not re-matched here; a user whose type
    /// changed is picked up by the next reconciliation of each training.
    pub async fn update_user(&self, user_id: Uuid, changes: UserChanges) -> PortResult<User> {
        if changes.is_empty() {
            return Err(PortError::Validation("Nothing to update".to_string()));
        }
        let name = changes.name.as_deref().map(require_name).transpose()?;
        let email = changes.email.as_deref().map(normalize_email).transpose()?;

        let mut tx = self.store.begin().await?;
        let mut user = tx
            .find_user(user_id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;

        if let Some(email) = email {
            if let Some(other) = tx.find_user_by_email(&email).await? {
                if other.id != user_id {
                    return Err(PortError::Validation(format!(
                        "E-mail {} is already registered",
                        email
                    )));
                }
            }
            user.email = email;
        }
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(user_type) = changes.user_type {
            user.user_type = Some(user_type);
        }
        if let Some(role) = changes.role {
            if role != user.role {
                info!(%user_id, from = user.role.as_str(), to = role.as_str(), "Role changed");
            }
            user.role = role;
        }

        tx.save_user(&user).await?;
        tx.commit().await?;
        Ok(user)
    }

    /// Removes a user along with every participation and reminder log of theirs.
    pub async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_user(user_id).await? {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        tx.commit().await?;
        info!(%user_id, "User deleted");
        Ok(())
    }
}

fn require_name(name: &str) -> PortResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PortError::Validation("A name is required".to_string()));
    }
    Ok(name.to_string())
}

fn normalize_email(email: &str) -> PortResult<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(PortError::Validation("An e-mail address is required".to_string()));
    }
    let pattern = Regex::new(EMAIL_PATTERN)
        .map_err(|e| PortError::Store(format!("Invalid e-mail pattern: {}", e)))?;
    if !pattern.is_match(&email) {
        return Err(PortError::Validation(format!(
            "'{}' is not a valid e-mail address",
            email
        )));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTraining, Role, TargetUserTypes, TrainingDetails, UserType};
    use crate::memory::InMemoryRosterStore;
    use crate::reconciler::RosterReconciler;

    fn new_user(name: &str, email: &str, user_type: UserType) -> NewUser {
        NewUser {
            name: name.to_string(),
            email: email.to_string(),
            user_type,
            role: Role::User,
        }
    }

    fn setup() -> (InMemoryRosterStore, UserDirectory) {
        let store = InMemoryRosterStore::new();
        let directory = UserDirectory::new(Arc::new(store.clone()));
        (store, directory)
    }

    #[tokio::test]
    async fn create_normalizes_email_and_requires_pin_setup() {
        let (store, directory) = setup();

        let user = directory
            .create_user(new_user("  Kim  ", " Kim@School.KR ", UserType::Teacher))
            .await
            .unwrap();

        assert_eq!(user.name, "Kim");
        assert_eq!(user.email, "kim@school.kr");
        assert!(user.must_set_pin);
        assert_eq!(store.find_user(user.id).await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let (_, directory) = setup();
        directory
            .create_user(new_user("Kim", "kim@school.kr", UserType::Teacher))
            .await
            .unwrap();

        let err = directory
            .create_user(new_user("Other Kim", "KIM@school.kr", UserType::Staff))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[tokio::test]
    async fn malformed_input_is_rejected() {
        let (store, directory) = setup();

        for (name, email) in [("", "a@b.kr"), ("A", "not-an-email"), ("A", "a@b"), ("A", "  ")] {
            let err = directory
                .create_user(new_user(name, email, UserType::Teacher))
                .await
                .unwrap_err();
            assert!(matches!(err, PortError::Validation(_)), "{name:?} {email:?}");
        }
        assert!(store.list_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_changes_role_and_keeps_email_unique() {
        let (_, directory) = setup();
        let kim = directory
            .create_user(new_user("Kim", "kim@school.kr", UserType::Teacher))
            .await
            .unwrap();
        let lee = directory
            .create_user(new_user("Lee", "lee@school.kr", UserType::Staff))
            .await
            .unwrap();

        let promoted = directory
            .update_user(
                kim.id,
                UserChanges {
                    role: Some(Role::TrainingAdmin),
                    user_type: Some(UserType::FixedTermTeacher),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::TrainingAdmin);
        assert_eq!(promoted.user_type, Some(UserType::FixedTermTeacher));

        // Re-submitting one's own address is fine; taking someone else's is not.
        directory
            .update_user(
                kim.id,
                UserChanges {
                    email: Some("KIM@school.kr".to_string()),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap();
        let err = directory
            .update_user(
                lee.id,
                UserChanges {
                    email: Some("kim@school.kr".to_string()),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[tokio::test]
    async fn update_rejects_empty_edits_and_unknown_users() {
        let (_, directory) = setup();

        let err = directory
            .update_user(Uuid::new_v4(), UserChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));

        let err = directory
            .update_user(
                Uuid::new_v4(),
                UserChanges {
                    name: Some("Nobody".to_string()),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn deleted_user_leaves_rosters_and_is_not_re_enrolled() {
        let (store, directory) = setup();
        let reconciler = RosterReconciler::new(Arc::new(store.clone()));
        let kim = directory
            .create_user(new_user("Kim", "kim@school.kr", UserType::Teacher))
            .await
            .unwrap();
        let lee = directory
            .create_user(new_user("Lee", "lee@school.kr", UserType::Teacher))
            .await
            .unwrap();
        let targets = TargetUserTypes::new([UserType::Teacher]);
        let (training, outcome) = reconciler
            .create_training(NewTraining {
                name: "Fire safety".to_string(),
                description: None,
                deadline: None,
                target_user_types: targets.clone(),
                details: TrainingDetails {
                    manager: "Park".to_string(),
                    ..TrainingDetails::default()
                },
            })
            .await
            .unwrap();
        assert_eq!(outcome.created, 2);

        directory.delete_user(kim.id).await.unwrap();

        assert!(store.find_user(kim.id).await.unwrap().is_none());
        assert!(store.participations_for_user(kim.id).await.unwrap().is_empty());

        let outcome = reconciler.reconcile(training.id, targets).await.unwrap();
        assert_eq!(outcome.created, 0);
        assert_eq!(outcome.retained, 1);
        let roster: Vec<Uuid> = store
            .participations_for_training(training.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.user_id)
            .collect();
        assert_eq!(roster, vec![lee.id]);

        let err = directory.delete_user(kim.id).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }
}
