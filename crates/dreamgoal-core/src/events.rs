use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::WeekId;
use crate::scoring::ScoringSource;

/// Every state change and every surfaced failure produces an Event.
/// Front ends and other subsystems subscribe through
/// [`StateStore::subscribe`](crate::state::StateStore::subscribe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A command was applied to the in-memory snapshot.
    StateChanged {
        revision: u64,
        change: String,
        at: DateTime<Utc>,
    },
    GoalCompleted {
        dream_id: String,
        goal_id: String,
        at: DateTime<Utc>,
    },
    DreamCompleted {
        dream_id: String,
        at: DateTime<Utc>,
    },
    PointsAwarded {
        entry_id: String,
        source: ScoringSource,
        points: u32,
        total_score: i64,
        at: DateTime<Utc>,
    },
    /// The goal change stuck but its scoring entry could not be written.
    ScoringFailed {
        source: ScoringSource,
        points: u32,
        message: String,
        at: DateTime<Utc>,
    },
    /// A store write failed; local state was left unchanged or restored.
    PersistFailed {
        operation: String,
        message: String,
        rolled_back: bool,
        at: DateTime<Utc>,
    },
    /// A toggle targeted a week other than the current one.
    ToggleIgnored {
        target_id: String,
        week_id: WeekId,
        current_week: WeekId,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::StateChanged { at, .. }
            | Event::GoalCompleted { at, .. }
            | Event::DreamCompleted { at, .. }
            | Event::PointsAwarded { at, .. }
            | Event::ScoringFailed { at, .. }
            | Event::PersistFailed { at, .. }
            | Event::ToggleIgnored { at, .. } => *at,
        }
    }

    /// Whether this event reports a failure the user should see.
    pub fn is_error(&self) -> bool {
        matches!(self, Event::ScoringFailed { .. } | Event::PersistFailed { .. })
    }
}
