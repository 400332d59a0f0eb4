//! Scoring entries and the points table.
//!
//! Entries are immutable records of points awarded for a qualifying event.
//! Point values come from [`ScoringRules`] so deployments can tune them
//! through configuration instead of code.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::WeekId;

/// What earned the points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringSource {
    Dream,
    Week,
    Connect,
    Milestone,
}

impl ScoringSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringSource::Dream => "dream",
            ScoringSource::Week => "week",
            ScoringSource::Connect => "connect",
            ScoringSource::Milestone => "milestone",
        }
    }
}

impl std::fmt::Display for ScoringSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Points per qualifying event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRules {
    #[serde(default = "default_dream_completed")]
    pub dream_completed: u32,
    #[serde(default = "default_weekly_goal_completed")]
    pub weekly_goal_completed: u32,
    #[serde(default = "default_milestone_completed")]
    pub milestone_completed: u32,
    #[serde(default = "default_connect_min")]
    pub connect_min: u32,
    #[serde(default = "default_connect_max")]
    pub connect_max: u32,
}

fn default_dream_completed() -> u32 {
    10
}
fn default_weekly_goal_completed() -> u32 {
    3
}
fn default_milestone_completed() -> u32 {
    15
}
fn default_connect_min() -> u32 {
    3
}
fn default_connect_max() -> u32 {
    5
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            dream_completed: default_dream_completed(),
            weekly_goal_completed: default_weekly_goal_completed(),
            milestone_completed: default_milestone_completed(),
            connect_min: default_connect_min(),
            connect_max: default_connect_max(),
        }
    }
}

impl ScoringRules {
    /// Base points for `source`. Connects use the low end of their range.
    pub fn points_for(&self, source: ScoringSource) -> u32 {
        match source {
            ScoringSource::Dream => self.dream_completed,
            ScoringSource::Week => self.weekly_goal_completed,
            ScoringSource::Milestone => self.milestone_completed,
            ScoringSource::Connect => self.connect_min,
        }
    }
}

/// Optional links carried by an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub dream_id: Option<String>,
    pub week_id: Option<WeekId>,
}

impl EntryMetadata {
    pub fn dream(dream_id: impl Into<String>) -> Self {
        Self {
            dream_id: Some(dream_id.into()),
            week_id: None,
        }
    }

    pub fn with_week(mut self, week_id: WeekId) -> Self {
        self.week_id = Some(week_id);
        self
    }
}

/// Immutable record of awarded points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringEntry {
    pub id: String,
    pub source: ScoringSource,
    pub points: u32,
    pub activity: String,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dream_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_id: Option<WeekId>,
}

impl ScoringEntry {
    /// Scoring year the entry is filed under.
    pub fn year(&self) -> i32 {
        self.date.year()
    }
}

/// Build an entry. Pure: identity and time are supplied by the caller.
pub fn create_scoring_entry(
    id: String,
    source: ScoringSource,
    points: u32,
    activity: impl Into<String>,
    metadata: EntryMetadata,
    date: DateTime<Utc>,
) -> ScoringEntry {
    ScoringEntry {
        id,
        source,
        points,
        activity: activity.into(),
        date,
        dream_id: metadata.dream_id,
        week_id: metadata.week_id,
    }
}

/// Sum of points, for reconciling a locally held entry list.
pub fn total_points(entries: &[ScoringEntry]) -> i64 {
    entries.iter().map(|e| i64::from(e.points)).sum()
}
