//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use roster_core::ports::RosterStore;
use roster_core::{
    CompletionRecorder, DuplicateResolver, ReminderPlanner, RosterReconciler, UserDirectory,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
/// Every engine receives the same store handle at construction.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RosterStore>,
    pub reconciler: RosterReconciler,
    pub resolver: DuplicateResolver,
    pub recorder: CompletionRecorder,
    pub planner: ReminderPlanner,
    pub directory: UserDirectory,
}

impl AppState {
    pub fn new(store: Arc<dyn RosterStore>, resolver_concurrency: usize) -> Self {
        Self {
            reconciler: RosterReconciler::new(store.clone()),
            resolver: DuplicateResolver::with_concurrency(store.clone(), resolver_concurrency),
            recorder: CompletionRecorder::new(store.clone()),
            planner: ReminderPlanner::new(store.clone()),
            directory: UserDirectory::new(store.clone()),
            store,
        }
    }
}
