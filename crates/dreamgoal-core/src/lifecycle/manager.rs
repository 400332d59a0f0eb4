//! Goal lifecycle orchestration.
//!
//! Every mutating operation follows the same sequence: read the latest
//! snapshot, compute the new state, persist it through the [`ItemStore`],
//! and only then dispatch the matching [`Command`]. Scoring awards come
//! last and never undo the change that earned them.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::locks::GoalLocks;
use super::outcome::{
    AwardStatus, CascadeReport, DreamCompletion, GoalCompletion, IncrementOutcome, LogOutcome,
    ToggleOutcome, ToggleReport,
};
use crate::calendar::{date_to_weeks, month_key, months_to_weeks, weeks_until_date, Clock, WeekId};
use crate::error::{CoreError, GoalError, Result, StoreError, ValidationError};
use crate::events::Event;
use crate::goal::{
    template_index, Dream, DreamPatch, DreamSpec, Goal, GoalKind, GoalSpec, WeeklyGoalInstance,
    WeeklyGoalTemplate,
};
use crate::scoring::{create_scoring_entry, EntryMetadata, ScoringRules, ScoringSource};
use crate::state::{Command, Snapshot, StateStore};
use crate::store::ItemStore;
use crate::streak::{compute_month_streak, compute_streak, goal_progress, GoalProgress};

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// What a toggle or skip id refers to.
enum Target {
    Goal(String),
    Instance(WeeklyGoalInstance),
}

/// Which current-week instance an edit applies to.
enum Slot<'a> {
    /// This week's instance of a template, created if missing.
    Template(&'a WeeklyGoalTemplate),
    /// An existing instance by id.
    Instance(&'a str),
}

/// Drives dreams, goals, and weekly instances for one user.
pub struct GoalManager {
    user_id: String,
    store: Arc<dyn ItemStore>,
    state: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    rules: ScoringRules,
    locks: GoalLocks,
}

impl GoalManager {
    /// Create a manager with an empty state store.
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn ItemStore>,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, ValidationError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(ValidationError::MissingUserId);
        }
        Ok(Self {
            user_id,
            store,
            state: Arc::new(StateStore::new()),
            clock,
            rules: ScoringRules::default(),
            locks: GoalLocks::new(),
        })
    }

    pub fn with_rules(mut self, rules: ScoringRules) -> Self {
        self.rules = rules;
        self
    }

    /// Share an existing state store, e.g. one a front end already watches.
    pub fn with_state(mut self, state: Arc<StateStore>) -> Self {
        self.state = state;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.state.subscribe()
    }

    pub fn current_week(&self) -> WeekId {
        self.clock.current_week()
    }

    // ── Loading ─────────────────────────────────────────────────────────

    /// Replace local state with the stored dreams, this week's instances,
    /// and this year's scoring entries.
    pub async fn load(&self) -> Result<Arc<Snapshot>> {
        let _week = self.locks.week().await;
        let _dreams = self.locks.dreams().await;

        let week_id = self.clock.current_week();
        let year = self.clock.now().year();
        let collection = self.store.load_dreams(&self.user_id).await?;
        let current = self.store.get_current_week(&self.user_id, week_id).await?;
        let book = self.store.load_scoring(&self.user_id, year).await?;

        let snapshot = self.state.dispatch(Command::Hydrate {
            dreams: collection.dreams,
            templates: collection.templates,
            week_id,
            instances: current.goals,
            total_score: book.total_score,
            scoring_entries: book.entries,
        });
        tracing::info!(
            backend = self.store.name(),
            dreams = snapshot.dreams.len(),
            instances = snapshot.instances.len(),
            total_score = snapshot.total_score,
            "state loaded"
        );
        Ok(snapshot)
    }

    /// This week's instances, fetching them if the week rolled over.
    pub async fn current_week_instances(&self) -> Result<(WeekId, Vec<WeeklyGoalInstance>)> {
        let _week = self.locks.week().await;
        let week_id = self.clock.current_week();
        let snapshot = self.ensure_week(week_id).await?;
        Ok((week_id, snapshot.instances.clone()))
    }

    // ── Dreams ──────────────────────────────────────────────────────────

    pub async fn add_dream(&self, spec: DreamSpec) -> Result<Dream> {
        let dream = spec.into_dream(new_id(), self.clock.now())?;

        let _dreams = self.locks.dreams().await;
        let snapshot = self.state.snapshot();
        let mut dreams = snapshot.dreams.clone();
        dreams.push(dream.clone());
        self.save_dreams("add_dream", &dreams, &snapshot.templates)
            .await?;
        self.state.dispatch(Command::ReplaceDreams {
            dreams,
            templates: snapshot.templates.clone(),
        });
        tracing::info!(dream_id = %dream.id, "dream added");
        Ok(dream)
    }

    /// Edit a dream's descriptive fields.
    ///
    /// Applied locally before the write; if the write fails the dream and
    /// template collections are restored and the error is surfaced.
    pub async fn update_dream(&self, dream_id: &str, patch: DreamPatch) -> Result<Dream> {
        let _dreams = self.locks.dreams().await;
        let before = self.state.snapshot();
        let mut dream = before
            .dream(dream_id)
            .cloned()
            .ok_or_else(|| GoalError::DreamNotFound(dream_id.to_string()))?;
        patch.apply(&mut dream, self.clock.now())?;

        let optimistic = self.state.dispatch(Command::UpsertDream(dream.clone()));
        if let Err(err) = self
            .store
            .save_dreams(&self.user_id, &optimistic.dreams, &optimistic.templates)
            .await
        {
            // Other slices may have moved on while we waited; only the
            // collections guarded by the dreams lock go back.
            let current = self.state.snapshot();
            let restored = Snapshot {
                dreams: before.dreams.clone(),
                templates: before.templates.clone(),
                ..(*current).clone()
            };
            self.state.dispatch(Command::Restore(Box::new(restored)));
            return Err(self.persist_failed("update_dream", err, true));
        }
        tracing::info!(dream_id, "dream updated");
        Ok(dream)
    }

    /// Mark a dream completed and award the one-time dream points.
    pub async fn complete_dream(&self, dream_id: &str) -> Result<DreamCompletion> {
        let dream = {
            let _dreams = self.locks.dreams().await;
            let snapshot = self.state.snapshot();
            let mut dream = snapshot
                .dream(dream_id)
                .cloned()
                .ok_or_else(|| GoalError::DreamNotFound(dream_id.to_string()))?;
            if dream.completed {
                return Err(GoalError::DreamAlreadyCompleted(dream_id.to_string()).into());
            }
            let now = self.clock.now();
            dream.completed = true;
            dream.completed_at = Some(now);
            dream.updated_at = now;

            let dreams: Vec<Dream> = snapshot
                .dreams
                .iter()
                .map(|d| if d.id == dream_id { dream.clone() } else { d.clone() })
                .collect();
            self.save_dreams("complete_dream", &dreams, &snapshot.templates)
                .await?;
            self.state.dispatch(Command::UpsertDream(dream.clone()));
            dream
        };

        tracing::info!(dream_id, "dream completed");
        self.state.publish(Event::DreamCompleted {
            dream_id: dream_id.to_string(),
            at: self.clock.now(),
        });
        let award = self
            .award(
                ScoringSource::Dream,
                format!("Dream completed: {}", dream.title),
                EntryMetadata::dream(dream_id),
            )
            .await;
        Ok(DreamCompletion { dream, award })
    }

    /// Delete a dream with its templates and this week's instances.
    pub async fn delete_dream(&self, dream_id: &str) -> Result<CascadeReport> {
        let report = self.remove_dream(dream_id).await;
        self.locks.prune();
        report
    }

    async fn remove_dream(&self, dream_id: &str) -> Result<CascadeReport> {
        let _week = self.locks.week().await;
        let week_id = self.clock.current_week();
        self.ensure_week(week_id).await?;

        let _dreams = self.locks.dreams().await;
        let snapshot = self.state.snapshot();
        let dream = snapshot
            .dream(dream_id)
            .ok_or_else(|| GoalError::DreamNotFound(dream_id.to_string()))?;
        let goal_ids: Vec<&str> = dream.goals.iter().map(|g| g.id.as_str()).collect();

        let dreams: Vec<Dream> = snapshot
            .dreams
            .iter()
            .filter(|d| d.id != dream_id)
            .cloned()
            .collect();
        let (removed, templates): (Vec<WeeklyGoalTemplate>, Vec<WeeklyGoalTemplate>) =
            snapshot.templates.iter().cloned().partition(|t| {
                t.dream_id == dream_id || goal_ids.iter().any(|g| t.links_goal(g))
            });

        self.save_dreams("delete_dream", &dreams, &templates).await?;
        self.state.dispatch(Command::ReplaceDreams { dreams, templates });
        tracing::info!(dream_id, templates = removed.len(), "dream deleted");

        let mut report = CascadeReport {
            goals_removed: goal_ids.len(),
            templates_removed: removed.len(),
            ..CascadeReport::default()
        };
        let removed_ids: HashSet<&str> = removed.iter().map(|t| t.id.as_str()).collect();
        self.purge_week_instances(
            "delete_dream",
            week_id,
            &snapshot.instances,
            |i| {
                i.dream_id.as_deref() == Some(dream_id)
                    || i
                        .template_id
                        .as_deref()
                        .is_some_and(|t| removed_ids.contains(t))
            },
            &mut report,
        )
        .await;
        Ok(report)
    }

    // ── Goals ───────────────────────────────────────────────────────────

    /// Add a goal to a dream. Recurring goals get their template in the
    /// same `save_dreams` payload.
    pub async fn add_goal(&self, dream_id: &str, spec: GoalSpec) -> Result<Goal> {
        spec.validate()?;
        if self.state.snapshot().dream(dream_id).is_none() {
            return Err(GoalError::DreamNotFound(dream_id.to_string()).into());
        }
        let goal = spec.into_goal(
            new_id(),
            self.clock.current_week(),
            self.clock.today(),
            self.clock.now(),
        )?;

        let _goal = self.locks.goal(&goal.id).await;
        self.commit_goal("add_goal", dream_id, goal, None).await
    }

    /// Replace a goal. Kind and recurrence are fixed at creation.
    ///
    /// Consistency goals are re-checked against their (possibly lowered)
    /// target and complete with a milestone if the streak already meets it.
    pub async fn update_goal(&self, dream_id: &str, goal: Goal) -> Result<Goal> {
        let _goal = self.locks.goal(&goal.id).await;
        let existing = self.existing_goal(dream_id, &goal.id)?;
        if existing.kind != goal.kind || existing.recurrence != goal.recurrence {
            return Err(ValidationError::InvalidValue {
                field: "type".to_string(),
                message: "goal type and recurrence cannot change".to_string(),
            }
            .into());
        }
        if goal.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }

        let mut goal = goal;
        let mut reached = false;
        match goal.kind {
            GoalKind::Deadline => {
                let target = goal.target_date.ok_or(ValidationError::MissingTargetDate)?;
                if existing.target_date != Some(target) && !goal.completed {
                    let week = self.clock.current_week();
                    goal.target_weeks = date_to_weeks(target, week);
                    goal.weeks_remaining = weeks_until_date(target, week);
                }
            }
            // A lowered target may already be met by the current streak.
            GoalKind::Consistency if !goal.completed => {
                let progress = goal_progress(&goal);
                goal.weeks_remaining = if goal.is_monthly() {
                    months_to_weeks(progress.remaining)
                } else {
                    progress.remaining
                };
                if progress.reached {
                    goal.mark_completed(self.clock.now());
                    reached = true;
                }
            }
            GoalKind::Consistency => {}
        }

        let goal = self.commit_goal("update_goal", dream_id, goal, None).await?;
        if reached {
            self.award_milestone(dream_id, &goal.title).await;
        }
        Ok(goal)
    }

    /// Remove a goal, its template, and its current-week instances.
    pub async fn delete_goal(&self, dream_id: &str, goal_id: &str) -> Result<CascadeReport> {
        let report = self.remove_goal(dream_id, goal_id).await;
        // The goal's lock entry is released by now.
        self.locks.prune();
        report
    }

    async fn remove_goal(&self, dream_id: &str, goal_id: &str) -> Result<CascadeReport> {
        let _goal = self.locks.goal(goal_id).await;
        let _week = self.locks.week().await;
        let week_id = self.clock.current_week();
        self.ensure_week(week_id).await?;

        let _dreams = self.locks.dreams().await;
        let snapshot = self.state.snapshot();
        self.existing_goal(dream_id, goal_id)?;

        let mut dreams = snapshot.dreams.clone();
        if let Some(dream) = dreams.iter_mut().find(|d| d.id == dream_id) {
            dream.goals.retain(|g| g.id != goal_id);
            dream.updated_at = self.clock.now();
        }
        let (removed, templates): (Vec<WeeklyGoalTemplate>, Vec<WeeklyGoalTemplate>) = snapshot
            .templates
            .iter()
            .cloned()
            .partition(|t| t.links_goal(goal_id));

        self.save_dreams("delete_goal", &dreams, &templates).await?;
        self.state.dispatch(Command::ReplaceDreams { dreams, templates });
        tracing::info!(dream_id, goal_id, "goal deleted");

        let mut report = CascadeReport {
            goals_removed: 1,
            templates_removed: removed.len(),
            ..CascadeReport::default()
        };
        let removed_ids: HashSet<&str> = removed.iter().map(|t| t.id.as_str()).collect();
        self.purge_week_instances(
            "delete_goal",
            week_id,
            &snapshot.instances,
            |i| {
                i.template_id
                    .as_deref()
                    .is_some_and(|t| removed_ids.contains(t))
            },
            &mut report,
        )
        .await;
        Ok(report)
    }

    /// Atomic goal+template write for consistency goals.
    ///
    /// Builds the complete dream and template collections, persists them
    /// with one `save_dreams`, and dispatches one command committing both.
    /// Nothing is dispatched if the write fails.
    pub async fn update_consistency_goal_and_template(
        &self,
        dream_id: &str,
        goal: Goal,
        template: Option<WeeklyGoalTemplate>,
    ) -> Result<Goal> {
        if goal.kind != GoalKind::Consistency {
            return Err(GoalError::NotConsistency(goal.id).into());
        }
        let _goal = self.locks.goal(&goal.id).await;
        self.existing_goal(dream_id, &goal.id)?;
        self.commit_goal("update_consistency_goal_and_template", dream_id, goal, template)
            .await
    }

    /// Deadline counterpart of
    /// [`update_consistency_goal_and_template`](Self::update_consistency_goal_and_template).
    pub async fn update_deadline_goal_and_template(
        &self,
        dream_id: &str,
        goal: Goal,
        template: Option<WeeklyGoalTemplate>,
    ) -> Result<Goal> {
        if goal.kind != GoalKind::Deadline {
            return Err(GoalError::NotDeadline(goal.id).into());
        }
        let _goal = self.locks.goal(&goal.id).await;
        self.existing_goal(dream_id, &goal.id)?;
        self.commit_goal("update_deadline_goal_and_template", dream_id, goal, template)
            .await
    }

    /// Explicitly complete a deadline goal, awarding the milestone once.
    pub async fn complete_deadline_goal(&self, goal_id: &str) -> Result<GoalCompletion> {
        let _goal = self.locks.goal(goal_id).await;
        let (dream_id, mut goal) = self.find_goal(goal_id)?;
        if goal.kind != GoalKind::Deadline {
            return Err(GoalError::NotDeadline(goal_id.to_string()).into());
        }
        ensure_open(&goal)?;

        goal.mark_completed(self.clock.now());
        let goal = self
            .commit_goal("complete_deadline_goal", &dream_id, goal, None)
            .await?;
        let award = self
            .award(
                ScoringSource::Milestone,
                format!("Goal completed: {}", goal.title),
                EntryMetadata::dream(&dream_id),
            )
            .await;
        Ok(GoalCompletion { goal, award })
    }

    /// Recompute `weeks_remaining` for every open goal against the current
    /// week. Returns how many goals changed; nothing is written if none did.
    pub async fn refresh_weeks_remaining(&self) -> Result<usize> {
        let _dreams = self.locks.dreams().await;
        let snapshot = self.state.snapshot();
        let week = self.clock.current_week();

        let mut dreams = snapshot.dreams.clone();
        let mut changed = 0;
        for goal in dreams.iter_mut().flat_map(|d| d.goals.iter_mut()) {
            if goal.completed {
                continue;
            }
            let remaining = match goal.kind {
                GoalKind::Deadline => goal
                    .target_date
                    .map(|date| weeks_until_date(date, week))
                    .unwrap_or(goal.weeks_remaining),
                GoalKind::Consistency if goal.is_monthly() => {
                    months_to_weeks(goal_progress(goal).remaining)
                }
                GoalKind::Consistency => goal_progress(goal).remaining,
            };
            if remaining != goal.weeks_remaining {
                goal.weeks_remaining = remaining;
                changed += 1;
            }
        }
        if changed == 0 {
            return Ok(0);
        }

        self.save_dreams("refresh_weeks_remaining", &dreams, &snapshot.templates)
            .await?;
        self.state.dispatch(Command::ReplaceDreams {
            dreams,
            templates: snapshot.templates.clone(),
        });
        tracing::info!(changed, week = %week, "weeks remaining refreshed");
        Ok(changed)
    }

    /// Streak and target for a goal.
    pub fn progress(&self, goal_id: &str) -> Result<GoalProgress> {
        let snapshot = self.state.snapshot();
        let (_, goal) = snapshot
            .goal(goal_id)
            .ok_or_else(|| GoalError::GoalNotFound(goal_id.to_string()))?;
        Ok(goal_progress(goal))
    }

    // ── Weekly occurrences ──────────────────────────────────────────────

    /// Flip this week's completion for a goal, template, or instance id.
    ///
    /// Recurring goals go through their template: this week's instance is
    /// found or created, flipped, and the whole instance list is written;
    /// the week is then recorded in the goal's log. Plain instances are
    /// flipped directly. Instances from any other week are left alone.
    /// Weekly points are awarded only on a `false -> true` flip.
    pub async fn toggle_weekly_goal(&self, id: &str) -> Result<ToggleOutcome> {
        let current_week = self.clock.current_week();
        match self.resolve_target(id)? {
            Target::Goal(goal_id) => self.toggle_template_goal(&goal_id, current_week).await,
            Target::Instance(instance) if instance.week_id != current_week => {
                Ok(self.ignore_toggle(id, instance.week_id, current_week))
            }
            Target::Instance(instance) => match &instance.template_id {
                Some(template_id) => {
                    let goal_id = self.template_goal_id(template_id)?;
                    self.toggle_template_goal(&goal_id, current_week).await
                }
                None => self.toggle_plain_instance(&instance.id, current_week).await,
            },
        }
    }

    async fn toggle_template_goal(&self, goal_id: &str, week: WeekId) -> Result<ToggleOutcome> {
        let _goal = self.locks.goal(goal_id).await;
        let (dream_id, goal) = self.find_goal(goal_id)?;
        ensure_weekly(&goal)?;
        let template = self.template_for(goal_id)?;

        let now = self.clock.now();
        let (instance, was_completed) = {
            let _week = self.locks.week().await;
            self.edit_week_instance("toggle_weekly_goal", week, Slot::Template(&template), |i| {
                let was = i.completed;
                i.toggle(now);
                Ok(was)
            })
            .await?
        };
        let completed = instance.completed;
        tracing::info!(goal_id, week = %week, completed, "weekly goal toggled");

        // Either side may already count this week (e.g. logged first).
        let was_completed = was_completed || goal.week_log.get(&week).copied().unwrap_or(false);
        let mut updated = goal.clone();
        let streak = record_week(&mut updated, week, completed, now);
        let newly_completed = updated.completed && !goal.completed;
        let committed = match self
            .commit_goal("toggle_weekly_goal", &dream_id, updated, None)
            .await
        {
            Ok(goal) => Some(goal),
            Err(err) => {
                tracing::warn!(goal_id, week = %week, error = %err, "week log not recorded");
                None
            }
        };
        let week_logged = committed.is_some();

        let weekly_award = if completed && !was_completed {
            self.award(
                ScoringSource::Week,
                format!("Weekly goal completed: {}", goal.title),
                EntryMetadata::dream(&dream_id).with_week(week),
            )
            .await
        } else {
            AwardStatus::NotEligible
        };
        let goal_completed = week_logged && newly_completed;
        let milestone_award = if goal_completed {
            self.award_milestone(&dream_id, &goal.title).await
        } else {
            AwardStatus::NotEligible
        };

        Ok(ToggleOutcome::Toggled(Box::new(ToggleReport {
            instance,
            goal: committed,
            streak: week_logged.then_some(streak),
            goal_completed,
            week_logged,
            weekly_award,
            milestone_award,
        })))
    }

    async fn toggle_plain_instance(&self, instance_id: &str, week: WeekId) -> Result<ToggleOutcome> {
        let _instance = self.locks.goal(instance_id).await;
        let now = self.clock.now();
        let (instance, was_completed) = {
            let _week = self.locks.week().await;
            self.edit_week_instance("toggle_weekly_goal", week, Slot::Instance(instance_id), |i| {
                let was = i.completed;
                i.toggle(now);
                Ok(was)
            })
            .await?
        };
        tracing::info!(instance_id, week = %week, completed = instance.completed, "weekly goal toggled");

        let weekly_award = if instance.completed && !was_completed {
            let metadata = EntryMetadata {
                dream_id: instance.dream_id.clone(),
                week_id: Some(week),
            };
            self.award(
                ScoringSource::Week,
                format!("Weekly goal completed: {}", instance.title),
                metadata,
            )
            .await
        } else {
            AwardStatus::NotEligible
        };

        Ok(ToggleOutcome::Toggled(Box::new(ToggleReport {
            instance,
            goal: None,
            streak: None,
            goal_completed: false,
            week_logged: false,
            weekly_award,
            milestone_award: AwardStatus::NotEligible,
        })))
    }

    /// Record a week's completion in a weekly goal's log.
    ///
    /// Completes the goal when the streak reaches its target. Logging the
    /// current week also sets this week's instance. Weekly points are
    /// awarded when the week turns completed; a week already completed in
    /// the log or on its instance awards nothing.
    pub async fn log_weekly_completion(
        &self,
        goal_id: &str,
        week_id: WeekId,
        completed: bool,
    ) -> Result<LogOutcome> {
        let current = self.clock.current_week();
        if week_id > current {
            return Err(ValidationError::InvalidValue {
                field: "weekId".to_string(),
                message: format!("{week_id} is after the current week {current}"),
            }
            .into());
        }

        let _goal = self.locks.goal(goal_id).await;
        let (dream_id, goal) = self.find_goal(goal_id)?;
        if goal.kind != GoalKind::Consistency {
            return Err(GoalError::NotConsistency(goal_id.to_string()).into());
        }
        if goal.is_monthly() {
            return Err(GoalError::MonthlyRequiresIncrement(goal_id.to_string()).into());
        }
        if !goal.active && !goal.completed {
            return Err(GoalError::Inactive(goal_id.to_string()).into());
        }

        let now = self.clock.now();
        let previous = goal.week_log.get(&week_id).copied();
        let instance_was_completed = self
            .sync_logged_instance(goal_id, week_id, current, completed, now)
            .await?;
        if previous == Some(completed) {
            return Ok(LogOutcome {
                streak: compute_streak(&goal.week_log, goal.start_date),
                goal,
                goal_completed: false,
                weekly_award: AwardStatus::NotEligible,
                milestone_award: AwardStatus::NotEligible,
            });
        }

        let mut updated = goal.clone();
        let streak = record_week(&mut updated, week_id, completed, now);
        let goal_completed = updated.completed && !goal.completed;
        let updated = self
            .commit_goal("log_weekly_completion", &dream_id, updated, None)
            .await?;

        let weekly_award = if completed && !instance_was_completed {
            self.award(
                ScoringSource::Week,
                format!("Weekly goal completed: {}", goal.title),
                EntryMetadata::dream(&dream_id).with_week(week_id),
            )
            .await
        } else {
            AwardStatus::NotEligible
        };
        let milestone_award = if goal_completed {
            self.award_milestone(&dream_id, &goal.title).await
        } else {
            AwardStatus::NotEligible
        };

        Ok(LogOutcome {
            goal: updated,
            streak,
            goal_completed,
            weekly_award,
            milestone_award,
        })
    }

    /// Bring this week's template instance in line with a logged value so
    /// the instance and the week log never disagree. Past weeks have no
    /// mutable instance. Returns whether the instance was already completed.
    async fn sync_logged_instance(
        &self,
        goal_id: &str,
        week_id: WeekId,
        current: WeekId,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if week_id != current {
            return Ok(false);
        }
        let Some(template) = self.state.snapshot().template_for_goal(goal_id).cloned() else {
            return Ok(false);
        };

        let _week = self.locks.week().await;
        let snapshot = self.ensure_week(week_id).await?;
        let was_completed = snapshot
            .instance_for_template(&template.id, week_id)
            .is_some_and(|i| i.completed);
        if was_completed != completed {
            self.edit_week_instance(
                "log_weekly_completion",
                week_id,
                Slot::Template(&template),
                |i| {
                    if i.completed != completed {
                        i.toggle(now);
                    }
                    Ok(())
                },
            )
            .await?;
            tracing::debug!(goal_id, week = %week_id, completed, "instance synced with week log");
        }
        Ok(was_completed)
    }

    /// Count one completion of a monthly goal for the current month.
    ///
    /// Reaching the goal's frequency completes the month; any increment
    /// past it is rejected with [`GoalError::FrequencyReached`] before
    /// anything is written.
    pub async fn increment_monthly_goal(&self, goal_id: &str) -> Result<IncrementOutcome> {
        let _goal = self.locks.goal(goal_id).await;
        let (dream_id, goal) = self.find_goal(goal_id)?;
        if !goal.is_monthly() {
            return Err(GoalError::NotMonthly(goal_id.to_string()).into());
        }
        ensure_open(&goal)?;
        let template = self.template_for(goal_id)?;

        let now = self.clock.now();
        let week = self.clock.current_week();
        let month = month_key(self.clock.today());
        let previous = goal.month_log.get(&month).copied().unwrap_or(0);
        if previous >= goal.frequency {
            return Err(GoalError::FrequencyReached {
                goal_id: goal_id.to_string(),
                frequency: goal.frequency,
                month,
            }
            .into());
        }
        let count = previous + 1;

        let mut updated = goal.clone();
        updated.month_log.insert(month.clone(), count);
        let month_streak =
            compute_month_streak(&updated.month_log, updated.frequency, updated.start_date);
        let target_months = updated.target_month_count();
        updated.weeks_remaining = months_to_weeks(target_months.saturating_sub(month_streak));
        if month_streak >= target_months {
            updated.mark_completed(now);
        }
        let goal_completed = updated.completed;
        let updated = self
            .commit_goal("increment_monthly_goal", &dream_id, updated, None)
            .await?;

        // The goal's month log is authoritative; the instance mirrors it for
        // the weekly view.
        let frequency = goal.frequency;
        let instance = {
            let _week = self.locks.week().await;
            self.edit_week_instance("increment_monthly_goal", week, Slot::Template(&template), |i| {
                i.completion_count = count;
                i.completion_dates.push(now);
                i.skipped = false;
                if count >= frequency && !i.completed {
                    i.completed = true;
                    i.completed_at = Some(now);
                }
                Ok(())
            })
            .await
            .map(|(instance, ())| instance)
            .map_err(|err| {
                tracing::warn!(goal_id, week = %week, error = %err, "instance not updated");
            })
            .ok()
        };
        tracing::info!(goal_id, month = %month, count, frequency, "monthly goal incremented");

        let period_completed = count == frequency;
        let period_award = if period_completed {
            self.award(
                ScoringSource::Week,
                format!("Monthly goal completed for {month}: {}", goal.title),
                EntryMetadata::dream(&dream_id).with_week(week),
            )
            .await
        } else {
            AwardStatus::NotEligible
        };
        let milestone_award = if goal_completed {
            self.award_milestone(&dream_id, &goal.title).await
        } else {
            AwardStatus::NotEligible
        };

        Ok(IncrementOutcome {
            goal: updated,
            instance,
            month,
            completion_count: count,
            period_completed,
            goal_completed,
            period_award,
            milestone_award,
        })
    }

    /// Mark this week's occurrence skipped.
    pub async fn skip_weekly_goal(&self, id: &str) -> Result<WeeklyGoalInstance> {
        let week = self.clock.current_week();
        let skip = |i: &mut WeeklyGoalInstance| -> Result<()> {
            if i.completed {
                return Err(GoalError::AlreadyCompleted(i.id.clone()).into());
            }
            i.skipped = true;
            Ok(())
        };

        let goal_id = match self.resolve_target(id)? {
            Target::Goal(goal_id) => goal_id,
            Target::Instance(instance) if instance.week_id != week => {
                return Err(ValidationError::InvalidValue {
                    field: "weekId".to_string(),
                    message: format!(
                        "{} is not the current week {week}",
                        instance.week_id
                    ),
                }
                .into());
            }
            Target::Instance(instance) => match &instance.template_id {
                Some(template_id) => self.template_goal_id(template_id)?,
                None => {
                    let _instance = self.locks.goal(&instance.id).await;
                    let _week = self.locks.week().await;
                    let (instance, ()) = self
                        .edit_week_instance("skip_weekly_goal", week, Slot::Instance(&instance.id), skip)
                        .await?;
                    return Ok(instance);
                }
            },
        };

        let _goal = self.locks.goal(&goal_id).await;
        let (_, goal) = self.find_goal(&goal_id)?;
        if !goal.is_recurring() {
            return Err(GoalError::NotRecurring(goal_id).into());
        }
        ensure_open(&goal)?;
        let template = self.template_for(&goal_id)?;
        let _week = self.locks.week().await;
        let (instance, ()) = self
            .edit_week_instance("skip_weekly_goal", week, Slot::Template(&template), skip)
            .await?;
        tracing::info!(goal_id = %goal_id, week = %week, "weekly goal skipped");
        Ok(instance)
    }

    /// Add a one-off weekly goal for the current week.
    pub async fn add_weekly_goal(
        &self,
        title: &str,
        dream_id: Option<&str>,
    ) -> Result<WeeklyGoalInstance> {
        if title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }
        if let Some(dream_id) = dream_id {
            if self.state.snapshot().dream(dream_id).is_none() {
                return Err(GoalError::DreamNotFound(dream_id.to_string()).into());
            }
        }

        let _week = self.locks.week().await;
        let week_id = self.clock.current_week();
        let snapshot = self.ensure_week(week_id).await?;
        let instance = WeeklyGoalInstance {
            id: new_id(),
            template_id: None,
            dream_id: dream_id.map(str::to_string),
            title: title.trim().to_string(),
            week_id,
            completed: false,
            completed_at: None,
            completion_count: 0,
            completion_dates: Vec::new(),
            skipped: false,
            created_at: self.clock.now(),
        };
        let mut instances = snapshot.instances.clone();
        instances.push(instance.clone());
        self.save_week("add_weekly_goal", week_id, &instances).await?;
        self.state.dispatch(Command::SetWeekInstances { week_id, instances });
        tracing::info!(instance_id = %instance.id, week = %week_id, "weekly goal added");
        Ok(instance)
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn find_goal(&self, goal_id: &str) -> Result<(String, Goal)> {
        let snapshot = self.state.snapshot();
        let (dream, goal) = snapshot
            .goal(goal_id)
            .ok_or_else(|| GoalError::GoalNotFound(goal_id.to_string()))?;
        Ok((dream.id.clone(), goal.clone()))
    }

    fn existing_goal(&self, dream_id: &str, goal_id: &str) -> Result<Goal> {
        let snapshot = self.state.snapshot();
        let dream = snapshot
            .dream(dream_id)
            .ok_or_else(|| GoalError::DreamNotFound(dream_id.to_string()))?;
        dream
            .goal(goal_id)
            .cloned()
            .ok_or_else(|| GoalError::GoalNotFound(goal_id.to_string()).into())
    }

    fn template_for(&self, goal_id: &str) -> Result<WeeklyGoalTemplate> {
        self.state
            .snapshot()
            .template_for_goal(goal_id)
            .cloned()
            .ok_or_else(|| GoalError::TemplateNotFound(goal_id.to_string()).into())
    }

    fn template_goal_id(&self, template_id: &str) -> Result<String> {
        self.state
            .snapshot()
            .template(template_id)
            .map(|t| t.linked_goal_id().to_string())
            .ok_or_else(|| GoalError::TemplateNotFound(template_id.to_string()).into())
    }

    fn resolve_target(&self, id: &str) -> Result<Target> {
        let snapshot = self.state.snapshot();
        if snapshot.goal(id).is_some() {
            return Ok(Target::Goal(id.to_string()));
        }
        if let Some(template) = snapshot.template(id) {
            return Ok(Target::Goal(template.linked_goal_id().to_string()));
        }
        if let Some(instance) = snapshot.instance(id) {
            return Ok(Target::Instance(instance.clone()));
        }
        Err(GoalError::GoalNotFound(id.to_string()).into())
    }

    fn ignore_toggle(&self, target_id: &str, week_id: WeekId, current_week: WeekId) -> ToggleOutcome {
        tracing::warn!(
            target_id,
            week = %week_id,
            current = %current_week,
            "toggle ignored: only the current week can change"
        );
        self.state.publish(Event::ToggleIgnored {
            target_id: target_id.to_string(),
            week_id,
            current_week,
            at: self.clock.now(),
        });
        ToggleOutcome::Ignored {
            target_id: target_id.to_string(),
            week_id,
            current_week,
        }
    }

    /// Make sure the snapshot holds `week_id`'s instances. Caller holds the
    /// week lock.
    async fn ensure_week(&self, week_id: WeekId) -> Result<Arc<Snapshot>> {
        let snapshot = self.state.snapshot();
        if snapshot.week_id == Some(week_id) {
            return Ok(snapshot);
        }
        let current = self.store.get_current_week(&self.user_id, week_id).await?;
        tracing::debug!(week = %week_id, instances = current.goals.len(), "week loaded");
        Ok(self.state.dispatch(Command::SetWeekInstances {
            week_id,
            instances: current.goals,
        }))
    }

    /// Apply `edit` to one current-week instance, then write the whole
    /// list and dispatch it. Caller holds the week lock.
    async fn edit_week_instance<T>(
        &self,
        operation: &str,
        week_id: WeekId,
        slot: Slot<'_>,
        edit: impl FnOnce(&mut WeeklyGoalInstance) -> Result<T>,
    ) -> Result<(WeeklyGoalInstance, T)> {
        let snapshot = self.ensure_week(week_id).await?;
        let mut instances = snapshot.instances.clone();
        let index = match slot {
            Slot::Template(template) => {
                match snapshot
                    .instance_for_template(&template.id, week_id)
                    .and_then(|found| instances.iter().position(|i| i.id == found.id))
                {
                    Some(index) => index,
                    None => {
                        instances.push(WeeklyGoalInstance::from_template(
                            template,
                            week_id,
                            new_id(),
                            self.clock.now(),
                        ));
                        instances.len() - 1
                    }
                }
            }
            Slot::Instance(instance_id) => instances
                .iter()
                .position(|i| i.id == instance_id)
                .ok_or_else(|| GoalError::GoalNotFound(instance_id.to_string()))?,
        };

        let value = edit(&mut instances[index])?;
        let instance = instances[index].clone();
        self.save_week(operation, week_id, &instances).await?;
        self.state
            .dispatch(Command::SetWeekInstances { week_id, instances });
        Ok((instance, value))
    }

    async fn purge_week_instances(
        &self,
        operation: &str,
        week_id: WeekId,
        instances: &[WeeklyGoalInstance],
        remove: impl Fn(&WeeklyGoalInstance) -> bool,
        report: &mut CascadeReport,
    ) {
        let kept: Vec<WeeklyGoalInstance> =
            instances.iter().filter(|i| !remove(i)).cloned().collect();
        let removed = instances.len() - kept.len();
        if removed == 0 {
            return;
        }
        match self.save_week(operation, week_id, &kept).await {
            Ok(()) => {
                self.state.dispatch(Command::SetWeekInstances {
                    week_id,
                    instances: kept,
                });
                report.instances_removed = removed;
            }
            Err(err) => report.week_cleanup_error = Some(err.to_string()),
        }
    }

    /// Persist `goal` and its template in one `save_dreams` call, then
    /// commit both with one dispatch. Caller holds the goal lock.
    async fn commit_goal(
        &self,
        operation: &str,
        dream_id: &str,
        goal: Goal,
        template: Option<WeeklyGoalTemplate>,
    ) -> Result<Goal> {
        let _dreams = self.locks.dreams().await;
        let snapshot = self.state.snapshot();
        let was_completed = snapshot
            .dream(dream_id)
            .ok_or_else(|| GoalError::DreamNotFound(dream_id.to_string()))?
            .goal(&goal.id)
            .is_some_and(|g| g.completed);

        let mut dreams = snapshot.dreams.clone();
        if let Some(dream) = dreams.iter_mut().find(|d| d.id == dream_id) {
            match dream.goal_mut(&goal.id) {
                Some(slot) => *slot = goal.clone(),
                None => dream.goals.push(goal.clone()),
            }
        }
        let mut templates = snapshot.templates.clone();
        let template = sync_template(&mut templates, dream_id, &goal, template);

        self.save_dreams(operation, &dreams, &templates).await?;
        self.state.dispatch(Command::CommitGoal {
            dream_id: dream_id.to_string(),
            goal: goal.clone(),
            template,
        });
        tracing::info!(operation, dream_id, goal_id = %goal.id, "goal committed");

        if goal.completed && !was_completed {
            tracing::info!(dream_id, goal_id = %goal.id, "goal completed");
            self.state.publish(Event::GoalCompleted {
                dream_id: dream_id.to_string(),
                goal_id: goal.id.clone(),
                at: goal.completed_at.unwrap_or_else(|| self.clock.now()),
            });
        }
        Ok(goal)
    }

    async fn save_dreams(
        &self,
        operation: &str,
        dreams: &[Dream],
        templates: &[WeeklyGoalTemplate],
    ) -> Result<()> {
        self.store
            .save_dreams(&self.user_id, dreams, templates)
            .await
            .map_err(|err| self.persist_failed(operation, err, false))
    }

    async fn save_week(
        &self,
        operation: &str,
        week_id: WeekId,
        instances: &[WeeklyGoalInstance],
    ) -> Result<()> {
        self.store
            .save_current_week(&self.user_id, week_id, instances)
            .await
            .map_err(|err| self.persist_failed(operation, err, false))
    }

    fn persist_failed(&self, operation: &str, err: StoreError, rolled_back: bool) -> CoreError {
        tracing::warn!(operation, error = %err, rolled_back, "store write failed");
        self.state.publish(Event::PersistFailed {
            operation: operation.to_string(),
            message: err.to_string(),
            rolled_back,
            at: self.clock.now(),
        });
        CoreError::Store(err)
    }

    async fn award_milestone(&self, dream_id: &str, title: &str) -> AwardStatus {
        self.award(
            ScoringSource::Milestone,
            format!("Goal milestone reached: {title}"),
            EntryMetadata::dream(dream_id),
        )
        .await
    }

    /// Append a scoring entry and record the new total. Failures are
    /// reported, never propagated.
    async fn award(
        &self,
        source: ScoringSource,
        activity: String,
        metadata: EntryMetadata,
    ) -> AwardStatus {
        let points = self.rules.points_for(source);
        let now: DateTime<Utc> = self.clock.now();
        let entry = create_scoring_entry(new_id(), source, points, activity, metadata, now);

        match self
            .store
            .add_scoring_entry(&self.user_id, entry.year(), &entry)
            .await
        {
            Ok(total) => {
                let entry_id = entry.id.clone();
                self.state.dispatch(Command::RecordScore {
                    entry,
                    total_score: total.total_score,
                });
                tracing::info!(source = %source, points, total = total.total_score, "points awarded");
                self.state.publish(Event::PointsAwarded {
                    entry_id: entry_id.clone(),
                    source,
                    points,
                    total_score: total.total_score,
                    at: now,
                });
                AwardStatus::Awarded {
                    entry_id,
                    points,
                    total_score: total.total_score,
                }
            }
            Err(err) => {
                tracing::warn!(source = %source, points, error = %err, "scoring entry not recorded");
                self.state.publish(Event::ScoringFailed {
                    source,
                    points,
                    message: err.to_string(),
                    at: now,
                });
                AwardStatus::Failed {
                    message: err.to_string(),
                }
            }
        }
    }
}

fn ensure_open(goal: &Goal) -> std::result::Result<(), GoalError> {
    if goal.completed {
        return Err(GoalError::AlreadyCompleted(goal.id.clone()));
    }
    if !goal.active {
        return Err(GoalError::Inactive(goal.id.clone()));
    }
    Ok(())
}

fn ensure_weekly(goal: &Goal) -> std::result::Result<(), GoalError> {
    if !goal.is_recurring() {
        return Err(GoalError::NotRecurring(goal.id.clone()));
    }
    if goal.is_monthly() {
        return Err(GoalError::MonthlyRequiresIncrement(goal.id.clone()));
    }
    ensure_open(goal)
}

/// Merge one week into the goal's log and apply the streak check.
/// Returns the new streak.
fn record_week(goal: &mut Goal, week: WeekId, completed: bool, now: DateTime<Utc>) -> u32 {
    goal.week_log.insert(week, completed);
    let streak = compute_streak(&goal.week_log, goal.start_date);
    if !goal.completed {
        goal.weeks_remaining = goal.target_weeks.saturating_sub(streak);
        if streak >= goal.target_weeks {
            goal.mark_completed(now);
        }
    }
    streak
}

/// Put the template for `goal` into `templates`: the explicit one if
/// given, else the existing one re-synced, else a new one for a recurring
/// goal. The template's `active` flag always follows the goal's.
fn sync_template(
    templates: &mut Vec<WeeklyGoalTemplate>,
    dream_id: &str,
    goal: &Goal,
    explicit: Option<WeeklyGoalTemplate>,
) -> Option<WeeklyGoalTemplate> {
    let index = template_index(templates, &goal.id);
    let mut next = match (explicit, index) {
        (Some(template), _) => template,
        (None, Some(i)) => {
            let mut template = templates[i].clone();
            template.sync_from(goal);
            template
        }
        (None, None) => WeeklyGoalTemplate::for_goal(dream_id, goal, new_id())?,
    };
    next.active = goal.active;
    match index {
        Some(i) => templates[i] = next.clone(),
        None => templates.push(next.clone()),
    }
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::FixedClock;
    use crate::goal::GoalSpec;
    use crate::store::{MemoryStore, StoreOp};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn setup() -> (GoalManager, Arc<MemoryStore>, Arc<FixedClock>, Dream) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
        let manager = GoalManager::new("u1", store.clone(), clock.clone()).unwrap();
        manager.load().await.unwrap();
        let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();
        (manager, store, clock, dream)
    }

    #[test]
    fn empty_user_id_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
        assert!(matches!(
            GoalManager::new("  ", store, clock),
            Err(ValidationError::MissingUserId)
        ));
    }

    #[tokio::test]
    async fn add_goal_writes_goal_and_template_once() {
        let (manager, store, _, dream) = setup().await;
        let before = store.calls(StoreOp::SaveDreams);

        let goal = manager
            .add_goal(&dream.id, GoalSpec::weekly("Run", 3))
            .await
            .unwrap();

        assert_eq!(store.calls(StoreOp::SaveDreams), before + 1);
        let stored = store.stored_collection("u1");
        assert_eq!(stored.dreams[0].goals[0].id, goal.id);
        assert_eq!(stored.templates.len(), 1);
        assert_eq!(stored.templates[0].goal_id, goal.id);
        assert_eq!(manager.snapshot().templates, stored.templates);
    }

    #[tokio::test]
    async fn validation_short_circuits_before_the_store() {
        let (manager, store, _, dream) = setup().await;
        let writes = store.write_calls();

        let err = manager
            .add_goal(&dream.id, GoalSpec::weekly("  ", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::EmptyTitle)));

        let mut spec = GoalSpec::deadline("Ship", date(2025, 12, 1));
        spec.target_date = None;
        let err = manager.add_goal(&dream.id, spec).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::MissingTargetDate)
        ));
        assert_eq!(store.write_calls(), writes);
    }

    #[tokio::test]
    async fn deadline_goal_counts_weeks_from_current_week() {
        let (manager, _, _, dream) = setup().await;
        // 2025-10-22 is in W43; 2025-11-19 is in W47.
        let goal = manager
            .add_goal(&dream.id, GoalSpec::deadline("Ship", date(2025, 11, 19)))
            .await
            .unwrap();
        assert_eq!(goal.target_weeks, 4);
        assert_eq!(goal.weeks_remaining, 4);
        assert!(manager.snapshot().templates.is_empty());
    }

    #[tokio::test]
    async fn toggle_awards_only_on_false_to_true() {
        let (manager, store, _, dream) = setup().await;
        let goal = manager
            .add_goal(&dream.id, GoalSpec::weekly("Run", 10))
            .await
            .unwrap();

        for _ in 0..3 {
            manager.toggle_weekly_goal(&goal.id).await.unwrap();
        }

        let entries = store.scoring_entries("u1", 2025);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.source == ScoringSource::Week));
        assert_eq!(manager.snapshot().total_score, 6);
        assert_eq!(manager.snapshot().instances.len(), 1);
    }

    #[tokio::test]
    async fn monthly_goals_cannot_be_toggled() {
        let (manager, _, _, dream) = setup().await;
        let goal = manager
            .add_goal(&dream.id, GoalSpec::monthly("Read", 3, 2))
            .await
            .unwrap();
        let err = manager.toggle_weekly_goal(&goal.id).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Goal(GoalError::MonthlyRequiresIncrement(_))
        ));
    }

    #[tokio::test]
    async fn scoring_failure_keeps_the_toggle() {
        let (manager, store, _, dream) = setup().await;
        let goal = manager
            .add_goal(&dream.id, GoalSpec::weekly("Run", 10))
            .await
            .unwrap();
        let mut events = manager.subscribe();
        store.fail(StoreOp::AddScoringEntry);

        let outcome = manager.toggle_weekly_goal(&goal.id).await.unwrap();
        let report = outcome.report().unwrap();
        assert!(report.instance.completed);
        assert!(matches!(report.weekly_award, AwardStatus::Failed { .. }));
        assert!(manager.snapshot().instances[0].completed);

        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            saw_failure |= matches!(event, Event::ScoringFailed { .. });
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn update_dream_rolls_back_on_failed_write() {
        let (manager, store, _, dream) = setup().await;
        store.fail(StoreOp::SaveDreams);
        let patch = DreamPatch {
            title: Some("Ultra".into()),
            ..DreamPatch::default()
        };

        let revision = manager.state().revision();
        let err = manager.update_dream(&dream.id, patch).await.unwrap_err();
        assert!(matches!(err, CoreError::Store(_)));

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.dream(&dream.id).unwrap().title, "Marathon");
        // Optimistic upsert, then the restore.
        assert_eq!(snapshot.revision, revision + 2);
    }

    #[tokio::test]
    async fn log_weekly_completion_rejects_future_weeks() {
        let (manager, _, _, dream) = setup().await;
        let goal = manager
            .add_goal(&dream.id, GoalSpec::weekly("Run", 3))
            .await
            .unwrap();
        let err = manager
            .log_weekly_completion(&goal.id, "2025-W44".parse().unwrap(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn refresh_recomputes_deadline_countdown() {
        let (manager, store, clock, dream) = setup().await;
        let goal = manager
            .add_goal(&dream.id, GoalSpec::deadline("Ship", date(2025, 11, 19)))
            .await
            .unwrap();

        assert_eq!(manager.refresh_weeks_remaining().await.unwrap(), 0);
        let writes = store.calls(StoreOp::SaveDreams);

        clock.advance_weeks(2);
        assert_eq!(manager.refresh_weeks_remaining().await.unwrap(), 1);
        assert_eq!(store.calls(StoreOp::SaveDreams), writes + 1);
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.goal(&goal.id).unwrap().1.weeks_remaining, 2);
    }

    #[tokio::test]
    async fn deleting_a_goal_forgets_its_lock() {
        let (manager, _, _, dream) = setup().await;
        let goal = manager
            .add_goal(&dream.id, GoalSpec::weekly("Run", 3))
            .await
            .unwrap();
        manager.toggle_weekly_goal(&goal.id).await.unwrap();
        assert!(manager.locks.tracked() >= 1);

        manager.delete_goal(&dream.id, &goal.id).await.unwrap();
        assert_eq!(manager.locks.tracked(), 0);
    }

    #[tokio::test]
    async fn deleting_a_dream_forgets_goal_locks() {
        let (manager, _, _, dream) = setup().await;
        for title in ["Run", "Swim"] {
            let goal = manager
                .add_goal(&dream.id, GoalSpec::weekly(title, 3))
                .await
                .unwrap();
            manager.toggle_weekly_goal(&goal.id).await.unwrap();
        }
        assert_eq!(manager.locks.tracked(), 2);

        manager.delete_dream(&dream.id).await.unwrap();
        assert_eq!(manager.locks.tracked(), 0);
    }

    #[tokio::test]
    async fn lowering_target_to_streak_completes_goal() {
        let (manager, store, _, dream) = setup().await;
        let goal = manager
            .add_goal(
                &dream.id,
                GoalSpec::weekly("Run", 3).starting(date(2025, 10, 6)),
            )
            .await
            .unwrap();
        for week in ["2025-W41", "2025-W42"] {
            manager
                .log_weekly_completion(&goal.id, week.parse().unwrap(), true)
                .await
                .unwrap();
        }

        let mut edited = manager.snapshot().goal(&goal.id).unwrap().1.clone();
        assert_eq!(edited.weeks_remaining, 1);
        edited.target_weeks = 2;
        let updated = manager.update_goal(&dream.id, edited).await.unwrap();

        assert!(updated.completed);
        assert_eq!(updated.weeks_remaining, 0);
        assert!(!manager.snapshot().template_for_goal(&goal.id).unwrap().active);
        let milestones = store
            .scoring_entries("u1", 2025)
            .into_iter()
            .filter(|e| e.source == ScoringSource::Milestone)
            .count();
        assert_eq!(milestones, 1);
    }

    #[tokio::test]
    async fn raising_target_recomputes_weeks_remaining() {
        let (manager, _, _, dream) = setup().await;
        let goal = manager
            .add_goal(&dream.id, GoalSpec::weekly("Run", 3))
            .await
            .unwrap();
        manager.toggle_weekly_goal(&goal.id).await.unwrap();

        let mut edited = manager.snapshot().goal(&goal.id).unwrap().1.clone();
        edited.target_weeks = 5;
        let updated = manager.update_goal(&dream.id, edited).await.unwrap();
        assert!(!updated.completed);
        assert_eq!(updated.weeks_remaining, 4);
    }

    #[test]
    fn sync_template_follows_goal_activity() {
        let now = Utc::now();
        let mut goal = GoalSpec::weekly("Run", 2)
            .into_goal("g1".into(), "2025-W43".parse().unwrap(), date(2025, 10, 22), now)
            .unwrap();
        let mut templates = Vec::new();
        let created = sync_template(&mut templates, "d1", &goal, None).unwrap();
        assert!(created.active);

        goal.mark_completed(now);
        let synced = sync_template(&mut templates, "d1", &goal, None).unwrap();
        assert_eq!(synced.id, created.id);
        assert!(!synced.active);
        assert_eq!(templates.len(), 1);
    }
}
