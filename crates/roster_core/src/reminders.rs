//! crates/roster_core/src/reminders.rs
//!
//! Works out which deadline reminders are due on a given day. Sending them is the
//! job of an external mailer, which also writes the reminder log this module reads.

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ReminderKind;
use crate::ports::{PortResult, RosterStore};

/// A missing-completion reminder is not repeated within this window.
pub const MISSING_REMINDER_COOLDOWN_DAYS: i64 = 7;

/// One reminder the mailer should send.
#[derive(Debug, Clone, PartialEq)]
pub struct DueReminder {
    pub training_id: Uuid,
    pub training_name: String,
    pub deadline: NaiveDate,
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    pub kind: ReminderKind,
}

/// The advance-notice reminders whose send day is `today`.
pub fn advance_notices(deadline: NaiveDate, today: NaiveDate) -> Vec<ReminderKind> {
    let mut kinds = Vec::new();
    if today.checked_add_months(Months::new(3)) == Some(deadline) {
        kinds.push(ReminderKind::ThreeMonths);
    }
    if today.checked_add_months(Months::new(1)) == Some(deadline) {
        kinds.push(ReminderKind::OneMonth);
    }
    kinds
}

/// Whether unfinished participants should be nagged about a missing completion number.
pub fn in_missing_window(deadline: NaiveDate, today: NaiveDate) -> bool {
    today
        .checked_add_months(Months::new(1))
        .is_some_and(|limit| deadline <= limit)
}

#[derive(Clone)]
pub struct ReminderPlanner {
    store: Arc<dyn RosterStore>,
}

impl ReminderPlanner {
    pub fn new(store: Arc<dyn RosterStore>) -> Self {
        Self { store }
    }

    /// Lists every reminder due at `now`, skipping those already logged.
    pub async fn plan(&self, now: DateTime<Utc>) -> PortResult<Vec<DueReminder>> {
        let today = now.date_naive();
        let users: HashMap<Uuid, _> = self
            .store
            .list_users()
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        let mut due = Vec::new();
        for training in self.store.list_trainings().await? {
            let Some(deadline) = training.deadline else {
                continue;
            };
            let notices = advance_notices(deadline, today);
            let nag = in_missing_window(deadline, today);
            if notices.is_empty() && !nag {
                continue;
            }

            for participation in self.store.participations_for_training(training.id).await? {
                let Some(user) = users.get(&participation.user_id) else {
                    warn!(participation_id = %participation.id, "Participation references a missing user");
                    continue;
                };

                let mut kinds = Vec::new();
                for &kind in &notices {
                    if self
                        .store
                        .last_reminder_at(training.id, user.id, kind)
                        .await?
                        .is_none()
                    {
                        kinds.push(kind);
                    }
                }
                if nag && !participation.has_completion_number() && !participation.is_completed() {
                    let last = self
                        .store
                        .last_reminder_at(training.id, user.id, ReminderKind::MissingCompletion)
                        .await?;
                    let cooldown_start = now - Duration::days(MISSING_REMINDER_COOLDOWN_DAYS);
                    if last.map_or(true, |sent| sent < cooldown_start) {
                        kinds.push(ReminderKind::MissingCompletion);
                    }
                }

                due.extend(kinds.into_iter().map(|kind| DueReminder {
                    training_id: training.id,
                    training_name: training.name.clone(),
                    deadline,
                    user_id: user.id,
                    user_name: user.name.clone(),
                    user_email: user.email.clone(),
                    kind,
                }));
            }
            debug!(training_id = %training.id, "Reminder candidates checked");
        }
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Participation, ParticipationStatus, ReminderLog, Role, TargetUserTypes, Training,
        TrainingDetails, User, UserType,
    };
    use crate::memory::InMemoryRosterStore;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn morning(date: NaiveDate) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_hms_opt(9, 0, 0).unwrap())
    }

    async fn store_with(deadline: NaiveDate) -> (InMemoryRosterStore, Uuid, Vec<Participation>) {
        let store = InMemoryRosterStore::new();
        let now = Utc::now();
        let training = Training {
            id: Uuid::new_v4(),
            name: "Fire drill".into(),
            description: None,
            deadline: Some(deadline),
            target_user_types: TargetUserTypes::new([UserType::Teacher]),
            details: TrainingDetails {
                manager: "Kim".into(),
                ..TrainingDetails::default()
            },
            created_at: now,
            updated_at: now,
        };
        let mut records = Vec::new();
        for name in ["A", "B"] {
            let user = User {
                id: Uuid::new_v4(),
                email: format!("{}@school.kr", name.to_lowercase()),
                name: name.into(),
                user_type: Some(UserType::Teacher),
                role: Role::User,
                must_set_pin: false,
            };
            let p = Participation::pending(training.id, user.id, now);
            store.insert_user(user).await;
            records.push(p);
        }
        let training_id = training.id;
        store.insert_training(training).await;
        for p in &records {
            store.insert_participation(p.clone()).await;
        }
        (store, training_id, records)
    }

    #[test]
    fn advance_notices_fire_on_exact_days() {
        let deadline = day(2025, 6, 30);
        assert_eq!(
            advance_notices(deadline, day(2025, 3, 30)),
            vec![ReminderKind::ThreeMonths]
        );
        assert_eq!(
            advance_notices(deadline, day(2025, 5, 30)),
            vec![ReminderKind::OneMonth]
        );
        assert!(advance_notices(deadline, day(2025, 5, 29)).is_empty());
    }

    #[test]
    fn missing_window_opens_one_month_ahead() {
        let deadline = day(2025, 6, 30);
        assert!(!in_missing_window(deadline, day(2025, 5, 29)));
        assert!(in_missing_window(deadline, day(2025, 5, 30)));
        assert!(in_missing_window(deadline, day(2025, 7, 10)));
    }

    #[tokio::test]
    async fn three_month_notice_is_sent_once() {
        let deadline = day(2025, 6, 30);
        let (store, training_id, records) = store_with(deadline).await;
        let now = morning(day(2025, 3, 30));
        store
            .record_reminder(ReminderLog {
                training_id,
                user_id: records[0].user_id,
                kind: ReminderKind::ThreeMonths,
                sent_at: now - Duration::hours(1),
            })
            .await;

        let due = ReminderPlanner::new(Arc::new(store)).plan(now).await.unwrap();

        assert_eq!(due.len(), 1);
        assert_eq!(due[0].user_id, records[1].user_id);
        assert_eq!(due[0].kind, ReminderKind::ThreeMonths);
    }

    #[tokio::test]
    async fn missing_reminder_skips_completed_and_recently_nagged() {
        let deadline = day(2025, 6, 10);
        let (store, training_id, mut records) = store_with(deadline).await;
        let now = morning(day(2025, 6, 1));

        records[0].status = ParticipationStatus::Completed;
        records[0].completion_number = Some("1".into());
        store.insert_participation(records[0].clone()).await;

        let due = ReminderPlanner::new(Arc::new(store.clone()))
            .plan(now)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].user_id, records[1].user_id);
        assert_eq!(due[0].kind, ReminderKind::MissingCompletion);

        store
            .record_reminder(ReminderLog {
                training_id,
                user_id: records[1].user_id,
                kind: ReminderKind::MissingCompletion,
                sent_at: now - Duration::days(3),
            })
            .await;
        let due = ReminderPlanner::new(Arc::new(store)).plan(now).await.unwrap();
        assert!(due.is_empty());
    }
}
