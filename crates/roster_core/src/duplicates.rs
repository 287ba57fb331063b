//! crates/roster_core/src/duplicates.rs
//!
//! Restores the "one participation per (training, user)" invariant.
//!
//! The sweep groups every record by its key. Each group with more than one record is
//! re-read, merged into a single canonical record and pruned inside its own
//! transaction, so two concurrent sweeps cannot both keep a different record.
//! Groups share no state: a failing group is counted and the sweep moves on.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Participation, ParticipationStatus};
use crate::ports::{PortResult, RosterStore};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Aggregate result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub groups_found: usize,
    pub groups_resolved: usize,
    pub groups_failed: usize,
    pub records_deleted: u64,
}

/// The surviving record of a group and the ids to delete.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub keep: Participation,
    pub discard: Vec<Uuid>,
    /// Whether `keep` differs from the stored canonical record.
    pub changed: bool,
}

enum GroupOutcome {
    Merged { deleted: u64 },
    /// Another writer already reduced the group to one record.
    AlreadyUnique,
}

#[derive(Clone)]
pub struct DuplicateResolver {
    store: Arc<dyn RosterStore>,
    concurrency: usize,
}

impl DuplicateResolver {
    pub fn new(store: Arc<dyn RosterStore>) -> Self {
        Self::with_concurrency(store, DEFAULT_CONCURRENCY)
    }

    pub fn with_concurrency(store: Arc<dyn RosterStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Sweeps the whole store. Only a failure to list the records is an error;
    /// per-group failures end up in `groups_failed`.
    pub async fn resolve_duplicates(&self) -> PortResult<ResolutionReport> {
        let all = self.store.list_participations().await?;
        let keys = duplicate_keys(&all);
        info!(
            records = all.len(),
            duplicate_groups = keys.len(),
            "Scanned participations for duplicates"
        );

        let mut report = ResolutionReport {
            groups_found: keys.len(),
            ..ResolutionReport::default()
        };

        let outcomes: Vec<_> = stream::iter(keys)
            .map(|(training_id, user_id)| async move {
                (
                    training_id,
                    user_id,
                    self.resolve_group(training_id, user_id).await,
                )
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (training_id, user_id, outcome) in outcomes {
            match outcome {
                Ok(GroupOutcome::Merged { deleted }) => {
                    report.groups_resolved += 1;
                    report.records_deleted += deleted;
                }
                Ok(GroupOutcome::AlreadyUnique) => {}
                Err(e) => {
                    warn!(%training_id, %user_id, error = %e, "Failed to resolve duplicate group");
                    report.groups_failed += 1;
                }
            }
        }

        info!(
            groups_resolved = report.groups_resolved,
            groups_failed = report.groups_failed,
            records_deleted = report.records_deleted,
            "Duplicate sweep finished"
        );
        Ok(report)
    }

    async fn resolve_group(&self, training_id: Uuid, user_id: Uuid) -> PortResult<GroupOutcome> {
        let mut tx = self.store.begin().await?;
        let members = tx.participations_for_pair(training_id, user_id).await?;
        let Some(plan) = plan_merge(members, Utc::now()) else {
            return Ok(GroupOutcome::AlreadyUnique);
        };

        if plan.changed {
            tx.save_participation(&plan.keep).await?;
        }
        let deleted = tx.delete_participations(&plan.discard).await?;
        tx.commit().await?;
        Ok(GroupOutcome::Merged { deleted })
    }
}

/// Keys carried by more than one record, in a stable order.
pub fn duplicate_keys(records: &[Participation]) -> Vec<(Uuid, Uuid)> {
    let mut counts: BTreeMap<(Uuid, Uuid), usize> = BTreeMap::new();
    for p in records {
        *counts.entry((p.training_id, p.user_id)).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(key, _)| key)
        .collect()
}

/// Chooses the canonical record of a group and folds completion evidence into it.
///
/// Precedence: a record with a completion number, most recently updated first;
/// otherwise the most recently updated record. Equal timestamps fall back to the
/// smaller id. `completed_at` becomes the earliest one in the group. Returns `None`
/// for groups with fewer than two records.
pub fn plan_merge(mut members: Vec<Participation>, now: DateTime<Utc>) -> Option<MergePlan> {
    if members.len() < 2 {
        return None;
    }
    members.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));

    let canonical_idx = members
        .iter()
        .position(Participation::has_completion_number)
        .unwrap_or(0);
    let canonical = members.remove(canonical_idx);
    let others = members;

    let mut keep = canonical.clone();

    let number_source = if canonical.has_completion_number() {
        Some(&canonical)
    } else {
        others.iter().find(|p| p.has_completion_number())
    };
    if let Some(source) = number_source {
        keep.completion_number = source.completion_number.clone();
    }

    let any_completed =
        canonical.is_completed() || others.iter().any(Participation::is_completed);
    if any_completed || number_source.is_some() {
        keep.status = ParticipationStatus::Completed;
        let earliest = std::iter::once(&canonical)
            .chain(others.iter())
            .filter_map(|p| p.completed_at)
            .min();
        keep.completed_at = earliest
            .or_else(|| number_source.map(|p| p.updated_at))
            .or(Some(canonical.updated_at));
    }

    let changed = keep != canonical;
    if changed {
        keep.updated_at = now;
    }

    Some(MergePlan {
        discard: others.iter().map(|p| p.id).collect(),
        keep,
        changed,
    })
}
