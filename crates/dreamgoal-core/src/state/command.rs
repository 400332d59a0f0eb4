//! Immutable snapshot and the pure reducer over it.

use serde::{Deserialize, Serialize};

use crate::calendar::WeekId;
use crate::goal::{template_index, Dream, Goal, WeeklyGoalInstance, WeeklyGoalTemplate};
use crate::scoring::ScoringEntry;

/// Everything the engine holds in memory for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub revision: u64,
    pub dreams: Vec<Dream>,
    pub templates: Vec<WeeklyGoalTemplate>,
    /// Week the `instances` list belongs to.
    pub week_id: Option<WeekId>,
    pub instances: Vec<WeeklyGoalInstance>,
    pub total_score: i64,
    pub scoring_entries: Vec<ScoringEntry>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            revision: 0,
            dreams: Vec::new(),
            templates: Vec::new(),
            week_id: None,
            instances: Vec::new(),
            total_score: 0,
            scoring_entries: Vec::new(),
        }
    }

    pub fn dream(&self, dream_id: &str) -> Option<&Dream> {
        self.dreams.iter().find(|d| d.id == dream_id)
    }

    pub fn goal(&self, goal_id: &str) -> Option<(&Dream, &Goal)> {
        crate::goal::find_goal(&self.dreams, goal_id)
    }

    pub fn template_for_goal(&self, goal_id: &str) -> Option<&WeeklyGoalTemplate> {
        template_index(&self.templates, goal_id).map(|i| &self.templates[i])
    }

    pub fn template(&self, template_id: &str) -> Option<&WeeklyGoalTemplate> {
        self.templates.iter().find(|t| t.id == template_id)
    }

    pub fn instance(&self, instance_id: &str) -> Option<&WeeklyGoalInstance> {
        self.instances.iter().find(|i| i.id == instance_id)
    }

    /// This week's instance of `template_id`, if one was created.
    pub fn instance_for_template(
        &self,
        template_id: &str,
        week_id: WeekId,
    ) -> Option<&WeeklyGoalInstance> {
        self.instances
            .iter()
            .find(|i| i.template_id.as_deref() == Some(template_id) && i.week_id == week_id)
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// One state mutation. Side effects never happen here; the lifecycle
/// manager persists first and dispatches the matching command afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Replace everything with freshly loaded data.
    Hydrate {
        dreams: Vec<Dream>,
        templates: Vec<WeeklyGoalTemplate>,
        week_id: WeekId,
        instances: Vec<WeeklyGoalInstance>,
        total_score: i64,
        scoring_entries: Vec<ScoringEntry>,
    },
    /// Whole-collection replacement after a successful `save_dreams`.
    ReplaceDreams {
        dreams: Vec<Dream>,
        templates: Vec<WeeklyGoalTemplate>,
    },
    /// Optimistic single-dream edit.
    UpsertDream(Dream),
    /// Goal and its template committed together.
    CommitGoal {
        dream_id: String,
        goal: Goal,
        template: Option<WeeklyGoalTemplate>,
    },
    SetWeekInstances {
        week_id: WeekId,
        instances: Vec<WeeklyGoalInstance>,
    },
    RecordScore {
        entry: ScoringEntry,
        total_score: i64,
    },
    /// Put back a snapshot taken before an optimistic update.
    Restore(Box<Snapshot>),
}

impl Command {
    /// Short label used in events and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Hydrate { .. } => "hydrate",
            Command::ReplaceDreams { .. } => "replace_dreams",
            Command::UpsertDream(_) => "upsert_dream",
            Command::CommitGoal { .. } => "commit_goal",
            Command::SetWeekInstances { .. } => "set_week_instances",
            Command::RecordScore { .. } => "record_score",
            Command::Restore(_) => "restore",
        }
    }
}

/// Apply `command` to `state`, producing the next snapshot.
///
/// The revision always advances, including on `Restore`, so observers can
/// tell a rollback happened.
pub fn reduce(state: &Snapshot, command: Command) -> Snapshot {
    let mut next = match command {
        Command::Restore(snapshot) => *snapshot,
        Command::Hydrate {
            dreams,
            templates,
            week_id,
            instances,
            total_score,
            scoring_entries,
        } => Snapshot {
            revision: state.revision,
            dreams,
            templates,
            week_id: Some(week_id),
            instances,
            total_score,
            scoring_entries,
        },
        Command::ReplaceDreams { dreams, templates } => Snapshot {
            dreams,
            templates,
            ..state.clone()
        },
        Command::UpsertDream(dream) => {
            let mut next = state.clone();
            match next.dreams.iter_mut().find(|d| d.id == dream.id) {
                Some(slot) => *slot = dream,
                None => next.dreams.push(dream),
            }
            next
        }
        Command::CommitGoal {
            dream_id,
            goal,
            template,
        } => {
            let mut next = state.clone();
            if let Some(dream) = next.dreams.iter_mut().find(|d| d.id == dream_id) {
                match dream.goal_mut(&goal.id) {
                    Some(slot) => *slot = goal.clone(),
                    None => dream.goals.push(goal.clone()),
                }
            }
            if let Some(template) = template {
                match template_index(&next.templates, &goal.id) {
                    Some(i) => next.templates[i] = template,
                    None => next.templates.push(template),
                }
            }
            next
        }
        Command::SetWeekInstances { week_id, instances } => Snapshot {
            week_id: Some(week_id),
            instances,
            ..state.clone()
        },
        Command::RecordScore { entry, total_score } => {
            let mut next = state.clone();
            next.scoring_entries.push(entry);
            next.total_score = total_score;
            next
        }
    };
    next.revision = state.revision + 1;
    next
}
