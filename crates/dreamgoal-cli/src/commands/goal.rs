//! Goal lifecycle commands for CLI.

use chrono::NaiveDate;
use clap::{Subcommand, ValueEnum};
use dreamgoal_core::{GoalError, GoalSpec, WeekId};
use serde_json::json;

use crate::context::{manager, print_json, CliResult};

#[derive(Clone, Copy, ValueEnum)]
pub enum GoalType {
    Weekly,
    Monthly,
    Deadline,
}

#[derive(Subcommand)]
pub enum GoalAction {
    /// Add a goal to a dream
    Add {
        dream_id: String,
        title: String,
        #[arg(long = "type", value_enum, default_value = "weekly")]
        kind: GoalType,
        /// Consecutive weeks required (weekly goals)
        #[arg(long)]
        weeks: Option<u32>,
        /// Consecutive months required (monthly goals)
        #[arg(long)]
        months: Option<u32>,
        /// Completions required per month (monthly goals)
        #[arg(long)]
        frequency: Option<u32>,
        /// Due date, YYYY-MM-DD (deadline goals)
        #[arg(long)]
        target_date: Option<NaiveDate>,
        /// First tracked day, YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        start_date: Option<NaiveDate>,
    },
    /// List goals, optionally for one dream
    List {
        #[arg(long)]
        dream: Option<String>,
    },
    /// Edit a goal's title, duration, or due date
    Update {
        dream_id: String,
        goal_id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        weeks: Option<u32>,
        #[arg(long)]
        target_date: Option<NaiveDate>,
    },
    /// Delete a goal with its template and this week's instances
    Delete { dream_id: String, goal_id: String },
    /// Flip this week's completion for a goal, template, or instance id
    Toggle { id: String },
    /// Record a week in a weekly goal's log
    Log {
        goal_id: String,
        /// ISO week, e.g. 2025-W43
        week: WeekId,
        /// Record the week as missed instead of completed
        #[arg(long)]
        missed: bool,
    },
    /// Count one completion of a monthly goal
    Increment { goal_id: String },
    /// Skip this week's occurrence
    Skip { id: String },
    /// Complete a deadline goal
    Complete { goal_id: String },
    /// Show streak and target for a consistency goal
    Progress { goal_id: String },
    /// Recompute weeks remaining for all open goals
    Refresh,
}

fn goal_spec(
    title: String,
    kind: GoalType,
    weeks: Option<u32>,
    months: Option<u32>,
    frequency: Option<u32>,
    target_date: Option<NaiveDate>,
) -> CliResult<GoalSpec> {
    let spec = match kind {
        GoalType::Weekly => GoalSpec::weekly(title, weeks.ok_or("--weeks is required")?),
        GoalType::Monthly => GoalSpec::monthly(
            title,
            months.ok_or("--months is required")?,
            frequency.unwrap_or(1),
        ),
        GoalType::Deadline => {
            GoalSpec::deadline(title, target_date.ok_or("--target-date is required")?)
        }
    };
    Ok(spec)
}

pub async fn run(action: GoalAction) -> CliResult {
    let manager = manager().await?;

    match action {
        GoalAction::Add {
            dream_id,
            title,
            kind,
            weeks,
            months,
            frequency,
            target_date,
            start_date,
        } => {
            let mut spec = goal_spec(title, kind, weeks, months, frequency, target_date)?;
            if let Some(start) = start_date {
                spec = spec.starting(start);
            }
            let goal = manager.add_goal(&dream_id, spec).await?;
            eprintln!("Goal created: {}", goal.id);
            print_json(&goal)?;
        }
        GoalAction::List { dream } => {
            let snapshot = manager.snapshot();
            let goals: Vec<_> = snapshot
                .dreams
                .iter()
                .filter(|d| dream.as_deref().map_or(true, |id| d.id == id))
                .flat_map(|d| {
                    d.goals
                        .iter()
                        .map(move |g| json!({ "dreamId": d.id, "status": g.status(), "goal": g }))
                })
                .collect();
            print_json(&goals)?;
        }
        GoalAction::Update {
            dream_id,
            goal_id,
            title,
            weeks,
            target_date,
        } => {
            let mut goal = manager
                .snapshot()
                .dream(&dream_id)
                .and_then(|d| d.goal(&goal_id))
                .cloned()
                .ok_or_else(|| GoalError::GoalNotFound(goal_id.clone()))?;
            if let Some(title) = title {
                goal.title = title;
            }
            if let Some(weeks) = weeks {
                goal.target_weeks = weeks;
            }
            if target_date.is_some() {
                goal.target_date = target_date;
            }
            print_json(&manager.update_goal(&dream_id, goal).await?)?;
        }
        GoalAction::Delete { dream_id, goal_id } => {
            print_json(&manager.delete_goal(&dream_id, &goal_id).await?)?;
        }
        GoalAction::Toggle { id } => {
            print_json(&manager.toggle_weekly_goal(&id).await?)?;
        }
        GoalAction::Log {
            goal_id,
            week,
            missed,
        } => {
            print_json(&manager.log_weekly_completion(&goal_id, week, !missed).await?)?;
        }
        GoalAction::Increment { goal_id } => {
            print_json(&manager.increment_monthly_goal(&goal_id).await?)?;
        }
        GoalAction::Skip { id } => {
            print_json(&manager.skip_weekly_goal(&id).await?)?;
        }
        GoalAction::Complete { goal_id } => {
            print_json(&manager.complete_deadline_goal(&goal_id).await?)?;
        }
        GoalAction::Progress { goal_id } => {
            print_json(&manager.progress(&goal_id)?)?;
        }
        GoalAction::Refresh => {
            let changed = manager.refresh_weeks_remaining().await?;
            print_json(&json!({ "changed": changed }))?;
        }
    }
    Ok(())
}
