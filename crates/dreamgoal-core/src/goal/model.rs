//! Dreams, goals, templates, and weekly instances.
//!
//! Field names serialize in camelCase to match the item store schema.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::WeekId;

/// Week-by-week completion record for a consistency goal.
pub type WeekLog = BTreeMap<WeekId, bool>;

/// Completions per calendar month (`YYYY-MM`) for monthly goals.
pub type MonthLog = BTreeMap<String, u32>;

/// How a goal is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalKind {
    /// Repeated completions toward a duration target.
    Consistency,
    /// A single target date.
    Deadline,
}

/// Period a consistency goal repeats over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Weekly,
    Monthly,
}

impl std::fmt::Display for GoalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GoalKind::Consistency => write!(f, "consistency"),
            GoalKind::Deadline => write!(f, "deadline"),
        }
    }
}

impl std::fmt::Display for Recurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recurrence::Weekly => write!(f, "weekly"),
            Recurrence::Monthly => write!(f, "monthly"),
        }
    }
}

/// Lifecycle position of a goal.
///
/// ```text
/// Draft -> Active -> (Completed | Deleted)
/// ```
///
/// `Deleted` goals no longer exist in the collection, so only the first
/// three are ever observed on a stored goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Draft,
    Active,
    Completed,
}

/// A goal owned by a dream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: GoalKind,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    pub target_weeks: u32,
    #[serde(default)]
    pub target_months: Option<u32>,
    /// Completions required per period.
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    pub weeks_remaining: u32,
    pub active: bool,
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub week_log: WeekLog,
    #[serde(default)]
    pub month_log: MonthLog,
}

fn default_frequency() -> u32 {
    1
}

impl Goal {
    pub fn is_recurring(&self) -> bool {
        self.kind == GoalKind::Consistency && self.recurrence.is_some()
    }

    pub fn is_monthly(&self) -> bool {
        self.recurrence == Some(Recurrence::Monthly)
    }

    pub fn status(&self) -> GoalStatus {
        if self.completed {
            GoalStatus::Completed
        } else if self.active {
            GoalStatus::Active
        } else {
            GoalStatus::Draft
        }
    }

    /// Flip into the terminal completed state.
    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        self.completed = true;
        self.active = false;
        self.completed_at = Some(at);
        self.weeks_remaining = 0;
    }

    /// Months a monthly goal must sustain, falling back to the week target.
    pub fn target_month_count(&self) -> u32 {
        self.target_months
            .unwrap_or_else(|| self.target_weeks.div_ceil(4).max(1))
    }
}

/// Persisted mirror of a recurring goal, independent of any week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyGoalTemplate {
    pub id: String,
    /// Canonical link to the owning goal.
    pub goal_id: String,
    pub dream_id: String,
    pub title: String,
    pub recurrence: Recurrence,
    pub target_weeks: u32,
    #[serde(default)]
    pub target_months: Option<u32>,
    pub frequency: u32,
    pub start_date: NaiveDate,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl WeeklyGoalTemplate {
    /// Build the template mirroring `goal`.
    pub fn for_goal(dream_id: &str, goal: &Goal, id: String) -> Option<Self> {
        let recurrence = goal.recurrence.filter(|_| goal.kind == GoalKind::Consistency)?;
        Some(Self {
            id,
            goal_id: goal.id.clone(),
            dream_id: dream_id.to_string(),
            title: goal.title.clone(),
            recurrence,
            target_weeks: goal.target_weeks,
            target_months: goal.target_months,
            frequency: goal.frequency,
            start_date: goal.start_date,
            active: goal.active,
            created_at: goal.created_at,
        })
    }

    /// Re-copy the scheduling fields from `goal`, keeping identity.
    pub fn sync_from(&mut self, goal: &Goal) {
        self.title = goal.title.clone();
        if let Some(recurrence) = goal.recurrence {
            self.recurrence = recurrence;
        }
        self.target_weeks = goal.target_weeks;
        self.target_months = goal.target_months;
        self.frequency = goal.frequency;
        self.start_date = goal.start_date;
        self.active = goal.active;
    }

    /// Whether this template belongs to `goal_id`.
    pub fn links_goal(&self, goal_id: &str) -> bool {
        // TODO: drop the `id == goal_id` fallback once stored templates
        // have all been rewritten with `goal_id` populated.
        self.goal_id == goal_id || self.id == goal_id
    }

    /// Id of the owning goal. Legacy templates without `goal_id` share
    /// the goal's id.
    pub fn linked_goal_id(&self) -> &str {
        if self.goal_id.is_empty() {
            &self.id
        } else {
            &self.goal_id
        }
    }
}

/// One goal's occurrence in one ISO week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyGoalInstance {
    pub id: String,
    /// Back-reference to the template; `None` for one-off weekly goals.
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub dream_id: Option<String>,
    pub title: String,
    pub week_id: WeekId,
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_count: u32,
    #[serde(default)]
    pub completion_dates: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub skipped: bool,
    pub created_at: DateTime<Utc>,
}

impl WeeklyGoalInstance {
    /// Fresh, incomplete instance of `template` for `week_id`.
    pub fn from_template(
        template: &WeeklyGoalTemplate,
        week_id: WeekId,
        id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            template_id: Some(template.id.clone()),
            dream_id: Some(template.dream_id.clone()),
            title: template.title.clone(),
            week_id,
            completed: false,
            completed_at: None,
            completion_count: 0,
            completion_dates: Vec::new(),
            skipped: false,
            created_at: now,
        }
    }

    /// Flip completion, returning the new value.
    pub fn toggle(&mut self, now: DateTime<Utc>) -> bool {
        self.completed = !self.completed;
        if self.completed {
            self.completed_at = Some(now);
            self.skipped = false;
        } else {
            self.completed_at = None;
        }
        self.completed
    }
}

/// A user's dream and the goals set against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dream {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub goals: Vec<Goal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dream {
    pub fn goal(&self, goal_id: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == goal_id)
    }

    pub fn goal_mut(&mut self, goal_id: &str) -> Option<&mut Goal> {
        self.goals.iter_mut().find(|g| g.id == goal_id)
    }
}

/// Find the dream owning `goal_id`.
pub fn find_goal<'a>(dreams: &'a [Dream], goal_id: &str) -> Option<(&'a Dream, &'a Goal)> {
    dreams
        .iter()
        .find_map(|d| d.goal(goal_id).map(|g| (d, g)))
}

/// Index of the template linked to `goal_id` (canonical link first).
pub fn template_index(templates: &[WeeklyGoalTemplate], goal_id: &str) -> Option<usize> {
    templates
        .iter()
        .position(|t| t.goal_id == goal_id)
        .or_else(|| templates.iter().position(|t| t.links_goal(goal_id)))
}
