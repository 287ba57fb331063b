pub mod completion;
pub mod directory;
pub mod domain;
pub mod duplicates;
pub mod eligibility;
pub mod memory;
pub mod ports;
pub mod reconciler;
pub mod reminders;
pub mod stats;

pub use completion::CompletionRecorder;
pub use directory::UserDirectory;
pub use domain::{
    Actor, NewTraining, NewUser, Participation, ParticipationStatus, ReminderKind, ReminderLog, Role,
    TargetUserTypes, Training, TrainingChanges, TrainingDetails, User, UserChanges, UserType,
};
pub use duplicates::{DuplicateResolver, ResolutionReport};
pub use eligibility::is_eligible;
pub use memory::InMemoryRosterStore;
pub use ports::{PortError, PortResult, RosterStore, RosterTransaction};
pub use reconciler::{ReconcileOutcome, RosterReconciler};
pub use reminders::{DueReminder, ReminderPlanner};
pub use stats::{incomplete_by_deadline, summarize, CompletionSummary};
