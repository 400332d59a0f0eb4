//! Consistency streaks over ISO weeks and calendar months.
//!
//! A streak is counted forward from the period containing the goal's start
//! date and stops at the first period that is missing or not completed.
//! It is the only gate for automatic goal completion.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::calendar::{month_key, next_month_start, WeekId};
use crate::goal::{Goal, MonthLog, Recurrence, WeekLog};

/// Consecutive completed weeks starting at the week of `start_date`.
pub fn compute_streak(week_log: &WeekLog, start_date: NaiveDate) -> u32 {
    let mut week = WeekId::containing(start_date);
    let mut streak = 0;
    while week_log.get(&week).copied().unwrap_or(false) {
        streak += 1;
        week = week.succ();
    }
    streak
}

/// Consecutive months, from the month of `start_date`, whose completion
/// count reached `frequency`.
pub fn compute_month_streak(month_log: &MonthLog, frequency: u32, start_date: NaiveDate) -> u32 {
    let required = frequency.max(1);
    let mut month = start_date.with_day(1).unwrap_or(start_date);
    let mut streak = 0;
    while month_log
        .get(&month_key(month))
        .is_some_and(|count| *count >= required)
    {
        streak += 1;
        month = next_month_start(month);
    }
    streak
}

/// Progress of one consistency goal toward its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub streak: u32,
    pub target: u32,
    pub remaining: u32,
    pub percent: u8,
    pub reached: bool,
}

impl GoalProgress {
    pub fn new(streak: u32, target: u32) -> Self {
        let percent = if target == 0 {
            100
        } else {
            ((u64::from(streak.min(target)) * 100) / u64::from(target)) as u8
        };
        Self {
            streak,
            target,
            remaining: target.saturating_sub(streak),
            percent,
            reached: streak >= target,
        }
    }
}

/// Streak and target for `goal`, weekly or monthly as its recurrence says.
pub fn goal_progress(goal: &Goal) -> GoalProgress {
    match goal.recurrence {
        Some(Recurrence::Monthly) => GoalProgress::new(
            compute_month_streak(&goal.month_log, goal.frequency, goal.start_date),
            goal.target_month_count(),
        ),
        _ => GoalProgress::new(
            compute_streak(&goal.week_log, goal.start_date),
            goal.target_weeks,
        ),
    }
}
