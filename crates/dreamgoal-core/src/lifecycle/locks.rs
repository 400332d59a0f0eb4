//! Async mutual exclusion for goal operations.
//!
//! Lock order is always goal, then week, then dreams. A goal lock is held
//! for a whole read-compute-persist-dispatch-award sequence, so two rapid
//! toggles of the same goal run one after the other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held lock; released on drop.
pub type LockGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct GoalLocks {
    goals: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    week: Arc<Mutex<()>>,
    dreams: Arc<Mutex<()>>,
}

impl GoalLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock one goal (or one plain instance) by id.
    pub async fn goal(&self, goal_id: &str) -> LockGuard {
        let lock = {
            let mut goals = match self.goals.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(goals.entry(goal_id.to_string()).or_default())
        };
        let guard = lock.lock_owned().await;
        tracing::debug!(goal_id, "goal lock acquired");
        guard
    }

    /// Lock the current-week instance list.
    pub async fn week(&self) -> LockGuard {
        let guard = Arc::clone(&self.week).lock_owned().await;
        tracing::debug!("week lock acquired");
        guard
    }

    /// Lock the dream and template collections.
    pub async fn dreams(&self) -> LockGuard {
        let guard = Arc::clone(&self.dreams).lock_owned().await;
        tracing::debug!("dreams lock acquired");
        guard
    }

    /// Number of goal ids with a lock entry.
    pub fn tracked(&self) -> usize {
        match self.goals.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Forget goal locks nobody holds or waits on.
    pub fn prune(&self) {
        let mut goals = match self.goals.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        goals.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
