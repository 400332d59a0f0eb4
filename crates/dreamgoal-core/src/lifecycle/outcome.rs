//! Results returned by [`GoalManager`](super::GoalManager) operations.

use serde::Serialize;

use crate::calendar::WeekId;
use crate::goal::{Dream, Goal, WeeklyGoalInstance};

/// What happened to the scoring side of an operation.
///
/// Scoring is a second, non-atomic write. A failure here never undoes the
/// goal change that earned the points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AwardStatus {
    /// No qualifying transition happened.
    NotEligible,
    Awarded {
        #[serde(rename = "entryId")]
        entry_id: String,
        points: u32,
        #[serde(rename = "totalScore")]
        total_score: i64,
    },
    Failed {
        message: String,
    },
}

impl AwardStatus {
    pub fn is_awarded(&self) -> bool {
        matches!(self, AwardStatus::Awarded { .. })
    }

    pub fn points(&self) -> u32 {
        match self {
            AwardStatus::Awarded { points, .. } => *points,
            _ => 0,
        }
    }
}

/// Outcome of a toggle that was applied.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleReport {
    pub instance: WeeklyGoalInstance,
    /// The owning goal after its week log was updated (template path only).
    pub goal: Option<Goal>,
    pub streak: Option<u32>,
    /// The goal reached its target with this toggle.
    pub goal_completed: bool,
    /// False when the instance was saved but the goal's week log write failed.
    pub week_logged: bool,
    pub weekly_award: AwardStatus,
    pub milestone_award: AwardStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ToggleOutcome {
    Toggled(Box<ToggleReport>),
    /// The target belongs to a week other than the current one.
    Ignored {
        #[serde(rename = "targetId")]
        target_id: String,
        #[serde(rename = "weekId")]
        week_id: WeekId,
        #[serde(rename = "currentWeek")]
        current_week: WeekId,
    },
}

impl ToggleOutcome {
    pub fn report(&self) -> Option<&ToggleReport> {
        match self {
            ToggleOutcome::Toggled(report) => Some(report.as_ref()),
            ToggleOutcome::Ignored { .. } => None,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, ToggleOutcome::Ignored { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogOutcome {
    pub goal: Goal,
    pub streak: u32,
    pub goal_completed: bool,
    pub weekly_award: AwardStatus,
    pub milestone_award: AwardStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementOutcome {
    pub goal: Goal,
    /// This week's instance; `None` if the instance list write failed.
    pub instance: Option<WeeklyGoalInstance>,
    pub month: String,
    /// Completions so far this month.
    pub completion_count: u32,
    /// The month reached the goal's frequency with this increment.
    pub period_completed: bool,
    pub goal_completed: bool,
    pub period_award: AwardStatus,
    pub milestone_award: AwardStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalCompletion {
    pub goal: Goal,
    pub award: AwardStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DreamCompletion {
    pub dream: Dream,
    pub award: AwardStatus,
}

/// What a delete removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub goals_removed: usize,
    pub templates_removed: usize,
    pub instances_removed: usize,
    /// Set when the dreams were deleted but the current-week cleanup write
    /// failed, leaving orphaned instances behind.
    pub week_cleanup_error: Option<String>,
}
