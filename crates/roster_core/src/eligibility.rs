//! crates/roster_core/src/eligibility.rs

use crate::domain::{TargetUserTypes, User};

/// Whether `user` belongs on the roster of a training targeting `targets`.
///
/// A user without a recognised category is never eligible.
pub fn is_eligible(user: &User, targets: &TargetUserTypes) -> bool {
    user.user_type.is_some_and(|t| targets.contains(t))
}
