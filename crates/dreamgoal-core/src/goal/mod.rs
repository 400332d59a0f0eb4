//! Goal data model: dreams, goals, recurring templates, and weekly instances.

mod model;
mod spec;

pub use model::{
    find_goal, template_index, Dream, Goal, GoalKind, GoalStatus, MonthLog, Recurrence,
    WeekLog, WeeklyGoalInstance, WeeklyGoalTemplate,
};
pub use spec::{DreamPatch, DreamSpec, GoalSpec};
