//! User input for creating dreams and goals, and its validation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Dream, Goal, GoalKind, MonthLog, Recurrence, WeekLog};
use crate::calendar::{date_to_weeks, months_to_weeks, weeks_until_date, WeekId};
use crate::error::ValidationError;

/// Request to create a goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSpec {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: GoalKind,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub target_weeks: Option<u32>,
    #[serde(default)]
    pub target_months: Option<u32>,
    #[serde(default)]
    pub frequency: Option<u32>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
}

impl GoalSpec {
    /// Weekly consistency goal held for `target_weeks` weeks. Each week
    /// counts once, so `frequency` stays 1.
    pub fn weekly(title: impl Into<String>, target_weeks: u32) -> Self {
        Self {
            title: title.into(),
            kind: GoalKind::Consistency,
            recurrence: Some(Recurrence::Weekly),
            target_weeks: Some(target_weeks),
            target_months: None,
            frequency: Some(1),
            start_date: None,
            target_date: None,
        }
    }

    /// Monthly consistency goal: `frequency` completions a month for
    /// `target_months` months.
    pub fn monthly(title: impl Into<String>, target_months: u32, frequency: u32) -> Self {
        Self {
            title: title.into(),
            kind: GoalKind::Consistency,
            recurrence: Some(Recurrence::Monthly),
            target_weeks: None,
            target_months: Some(target_months),
            frequency: Some(frequency),
            start_date: None,
            target_date: None,
        }
    }

    /// Deadline goal due on `target_date`.
    pub fn deadline(title: impl Into<String>, target_date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            kind: GoalKind::Deadline,
            recurrence: None,
            target_weeks: None,
            target_months: None,
            frequency: None,
            start_date: None,
            target_date: Some(target_date),
        }
    }

    pub fn starting(mut self, start_date: NaiveDate) -> Self {
        self.start_date = Some(start_date);
        self
    }

    /// Check the spec without building anything.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.frequency == Some(0) {
            return Err(invalid("frequency", "must be at least 1"));
        }
        match self.kind {
            GoalKind::Deadline => {
                if self.target_date.is_none() {
                    return Err(ValidationError::MissingTargetDate);
                }
                if self.recurrence.is_some() {
                    return Err(invalid("recurrence", "deadline goals do not repeat"));
                }
            }
            GoalKind::Consistency => match self.recurrence.unwrap_or(Recurrence::Weekly) {
                Recurrence::Weekly => {
                    let weeks = self
                        .target_weeks
                        .or(self.target_months.map(months_to_weeks))
                        .unwrap_or(0);
                    if weeks == 0 {
                        return Err(invalid("targetWeeks", "must be at least 1"));
                    }
                    if self.frequency.unwrap_or(1) != 1 {
                        return Err(invalid("frequency", "weekly goals complete once per week"));
                    }
                }
                Recurrence::Monthly => {
                    if self.target_months.unwrap_or(0) == 0 {
                        return Err(invalid("targetMonths", "must be at least 1"));
                    }
                }
            },
        }
        Ok(())
    }

    /// Validate and derive the stored goal.
    ///
    /// `current_week` anchors the week counts; deadline goals measure from
    /// it, consistency goals count `target_weeks` from their start.
    pub fn into_goal(
        self,
        id: String,
        current_week: WeekId,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Goal, ValidationError> {
        self.validate()?;
        let start_date = self.start_date.unwrap_or(today);
        let frequency = self.frequency.unwrap_or(1);

        let (recurrence, target_weeks, target_months, weeks_remaining) = match self.kind {
            GoalKind::Deadline => {
                let target = self.target_date.ok_or(ValidationError::MissingTargetDate)?;
                (
                    None,
                    date_to_weeks(target, current_week),
                    None,
                    weeks_until_date(target, current_week),
                )
            }
            GoalKind::Consistency => {
                let recurrence = self.recurrence.unwrap_or(Recurrence::Weekly);
                let weeks = match (self.target_weeks, self.target_months) {
                    (Some(weeks), _) => weeks,
                    (None, Some(months)) => months_to_weeks(months),
                    (None, None) => 0,
                };
                (Some(recurrence), weeks, self.target_months, weeks)
            }
        };

        Ok(Goal {
            id,
            title: self.title.trim().to_string(),
            kind: self.kind,
            recurrence,
            target_weeks,
            target_months,
            frequency,
            start_date,
            target_date: self.target_date,
            weeks_remaining,
            active: true,
            completed: false,
            completed_at: None,
            created_at: now,
            week_log: WeekLog::new(),
            month_log: MonthLog::new(),
        })
    }
}

fn invalid(field: &str, message: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Request to create a dream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DreamSpec {
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl DreamSpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn into_dream(self, id: String, now: DateTime<Utc>) -> Result<Dream, ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        Ok(Dream {
            id,
            title: self.title.trim().to_string(),
            category: self.category,
            description: self.description,
            completed: false,
            completed_at: None,
            goals: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial edit of a dream's descriptive fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DreamPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl DreamPatch {
    pub fn apply(&self, dream: &mut Dream, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(ValidationError::EmptyTitle);
            }
            dream.title = title.trim().to_string();
        }
        if let Some(category) = &self.category {
            dream.category = Some(category.clone());
        }
        if let Some(description) = &self.description {
            dream.description = Some(description.clone());
        }
        dream.updated_at = now;
        Ok(())
    }
}
