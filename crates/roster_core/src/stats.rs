//! crates/roster_core/src/stats.rs

use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{Participation, ParticipationStatus, Training};

/// Completion figures over a set of participations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionSummary {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Percentage in `0.0..=100.0`; zero when there is nothing to complete.
    pub completion_rate: f64,
}

pub fn summarize(participations: &[Participation]) -> CompletionSummary {
    let total = participations.len();
    let completed = participations.iter().filter(|p| p.is_completed()).count();
    let completion_rate = if total > 0 {
        completed as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    CompletionSummary {
        total,
        completed,
        pending: total - completed,
        completion_rate,
    }
}

/// Pending participations, earliest training deadline first. Trainings without a
/// deadline come last; records of unknown trainings are dropped.
pub fn incomplete_by_deadline(
    participations: Vec<Participation>,
    trainings: &HashMap<Uuid, Training>,
) -> Vec<Participation> {
    let mut pending: Vec<Participation> = participations
        .into_iter()
        .filter(|p| p.status == ParticipationStatus::Pending)
        .filter(|p| trainings.contains_key(&p.training_id))
        .collect();
    let deadline = |p: &Participation| trainings.get(&p.training_id).and_then(|t| t.deadline);
    pending.sort_by(|a, b| match (deadline(a), deadline(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TargetUserTypes, TrainingDetails};
    use chrono::{NaiveDate, Utc};

    #[test]
    fn counts_and_rate() {
        let training_id = Uuid::new_v4();
        let mut records: Vec<Participation> = (0..4)
            .map(|_| Participation::pending(training_id, Uuid::new_v4(), Utc::now()))
            .collect();
        records[0].status = ParticipationStatus::Completed;

        let summary = summarize(&records);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.pending, 3);
        assert!((summary.completion_rate - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_roster_has_zero_rate() {
        assert_eq!(summarize(&[]).completion_rate, 0.0);
    }

    fn training(deadline: Option<NaiveDate>) -> Training {
        let now = Utc::now();
        Training {
            id: Uuid::new_v4(),
            name: "Safety".into(),
            description: None,
            deadline,
            target_user_types: TargetUserTypes::default(),
            details: TrainingDetails::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn incomplete_list_is_pending_only_and_ordered_by_deadline() {
        let late = training(NaiveDate::from_ymd_opt(2025, 12, 1));
        let early = training(NaiveDate::from_ymd_opt(2025, 6, 1));
        let open_ended = training(None);
        let now = Utc::now();
        let user = Uuid::new_v4();

        let mut done = Participation::pending(early.id, Uuid::new_v4(), now);
        done.status = ParticipationStatus::Completed;
        let records = vec![
            Participation::pending(open_ended.id, user, now),
            Participation::pending(late.id, user, now),
            done,
            Participation::pending(early.id, user, now),
            Participation::pending(Uuid::new_v4(), user, now),
        ];
        let trainings: HashMap<Uuid, Training> = [late.clone(), early.clone(), open_ended.clone()]
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let order: Vec<Uuid> = incomplete_by_deadline(records, &trainings)
            .into_iter()
            .map(|p| p.training_id)
            .collect();

        assert_eq!(order, vec![early.id, late.id, open_ended.id]);
    }
}
