use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::calendar::WeekId;
use crate::error::StoreError;
use crate::goal::{Dream, WeeklyGoalInstance, WeeklyGoalTemplate};
use crate::scoring::ScoringEntry;

/// Item kinds in the external item store (`{id, userId, type, ...}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Dream,
    WeeklyGoal,
    WeeklyGoalTemplate,
    ScoringEntry,
    Connect,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Dream => "dream",
            ItemType::WeeklyGoal => "weekly_goal",
            ItemType::WeeklyGoalTemplate => "weekly_goal_template",
            ItemType::ScoringEntry => "scoring_entry",
            ItemType::Connect => "connect",
        }
    }
}

/// A user's dreams together with the recurring templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DreamCollection {
    pub dreams: Vec<Dream>,
    pub templates: Vec<WeeklyGoalTemplate>,
}

/// Instance list for one ISO week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentWeek {
    pub week_id: WeekId,
    pub goals: Vec<WeeklyGoalInstance>,
}

/// Cumulative score after an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreTotal {
    pub total_score: i64,
}

/// All entries for one scoring year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBook {
    pub entries: Vec<ScoringEntry>,
    pub total_score: i64,
}

/// Persistence collaborator for the goal engine.
///
/// Writes always carry whole collections: the backing store's atomicity
/// unit is the collection, so the engine never sends partial diffs.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    async fn load_dreams(&self, user_id: &str) -> Result<DreamCollection, StoreError>;

    /// Replace the entire dream list and the entire template list.
    async fn save_dreams(
        &self,
        user_id: &str,
        dreams: &[Dream],
        templates: &[WeeklyGoalTemplate],
    ) -> Result<(), StoreError>;

    /// Instances for `week_id`; empty when none were saved for that week.
    async fn get_current_week(
        &self,
        user_id: &str,
        week_id: WeekId,
    ) -> Result<CurrentWeek, StoreError>;

    /// Replace the full instance list for `week_id`.
    async fn save_current_week(
        &self,
        user_id: &str,
        week_id: WeekId,
        goals: &[WeeklyGoalInstance],
    ) -> Result<(), StoreError>;

    /// Append one entry and return the new total for `year`.
    async fn add_scoring_entry(
        &self,
        user_id: &str,
        year: i32,
        entry: &ScoringEntry,
    ) -> Result<ScoreTotal, StoreError>;

    async fn load_scoring(&self, user_id: &str, year: i32) -> Result<ScoreBook, StoreError>;
}
