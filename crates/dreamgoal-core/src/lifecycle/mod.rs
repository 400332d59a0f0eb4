//! Goal lifecycle: the orchestration layer between callers, the item store,
//! and the state store.

mod locks;
mod manager;
mod outcome;

pub use locks::{GoalLocks, LockGuard};
pub use manager::GoalManager;
pub use outcome::{
    AwardStatus, CascadeReport, DreamCompletion, GoalCompletion, IncrementOutcome, LogOutcome,
    ToggleOutcome, ToggleReport,
};
