//! Integration tests for persistence ordering, locking, cascades, and
//! reloading state from a real store.

use std::sync::Arc;

use chrono::NaiveDate;
use dreamgoal_core::calendar::{Clock, FixedClock, WeekId};
use dreamgoal_core::error::CoreError;
use dreamgoal_core::events::Event;
use dreamgoal_core::goal::{DreamSpec, GoalSpec};
use dreamgoal_core::lifecycle::GoalManager;
use dreamgoal_core::scoring::ScoringSource;
use dreamgoal_core::store::{ItemStore, MemoryStore, SqliteItemStore, StoreOp};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn week(s: &str) -> WeekId {
    s.parse().unwrap()
}

async fn manager_with(store: Arc<dyn ItemStore>, clock: Arc<FixedClock>) -> GoalManager {
    let manager = GoalManager::new("u1", store, clock).unwrap();
    manager.load().await.unwrap();
    manager
}

#[tokio::test]
async fn test_failed_dual_write_dispatches_nothing() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
    let manager = manager_with(store.clone(), clock.clone()).await;
    let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();
    let goal = manager
        .add_goal(&dream.id, GoalSpec::weekly("Run", 3))
        .await
        .unwrap();

    let snapshot = manager.snapshot();
    let mut completed_goal = snapshot.goal(&goal.id).unwrap().1.clone();
    completed_goal.mark_completed(clock.now());
    let mut template = snapshot.template_for_goal(&goal.id).unwrap().clone();
    template.active = false;

    store.fail(StoreOp::SaveDreams);
    let revision = manager.state().revision();
    let mut events = manager.subscribe();

    let err = manager
        .update_consistency_goal_and_template(&dream.id, completed_goal, Some(template))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Store(_)));

    assert_eq!(manager.state().revision(), revision);
    let after = manager.snapshot();
    assert!(!after.goal(&goal.id).unwrap().1.completed);
    assert!(after.template_for_goal(&goal.id).unwrap().active);
    assert!(matches!(
        events.try_recv(),
        Ok(Event::PersistFailed {
            rolled_back: false,
            ..
        })
    ));
}

#[tokio::test]
async fn test_dual_write_commits_goal_and_template_together() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
    let manager = manager_with(store.clone(), clock.clone()).await;
    let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();
    let goal = manager
        .add_goal(&dream.id, GoalSpec::weekly("Run", 3))
        .await
        .unwrap();

    let mut renamed = goal.clone();
    renamed.title = "Run 10k".into();
    renamed.target_weeks = 6;
    let revision = manager.state().revision();
    manager
        .update_consistency_goal_and_template(&dream.id, renamed, None)
        .await
        .unwrap();

    // One dispatch for both entities.
    assert_eq!(manager.state().revision(), revision + 1);
    let stored = store.stored_collection("u1");
    assert_eq!(stored.dreams[0].goals[0].title, "Run 10k");
    assert_eq!(stored.templates[0].title, "Run 10k");
    assert_eq!(stored.templates[0].target_weeks, 6);
    assert_eq!(manager.snapshot().templates, stored.templates);
}

#[tokio::test]
async fn test_concurrent_toggles_of_one_goal_award_once() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
    let manager = manager_with(store.clone(), clock).await;
    let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();
    let goal = manager
        .add_goal(&dream.id, GoalSpec::weekly("Run", 10))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        manager.toggle_weekly_goal(&goal.id),
        manager.toggle_weekly_goal(&goal.id)
    );
    let flips = [
        a.unwrap().report().unwrap().instance.completed,
        b.unwrap().report().unwrap().instance.completed,
    ];
    assert_eq!(flips.iter().filter(|done| **done).count(), 1);

    assert_eq!(store.scoring_entries("u1", 2025).len(), 1);
    assert_eq!(store.calls(StoreOp::SaveCurrentWeek), 2);
    let stored = store.stored_week("u1", week("2025-W43"));
    assert_eq!(stored.len(), 1);
    assert!(!stored[0].completed);
}

#[tokio::test]
async fn test_concurrent_toggles_of_different_goals_keep_both_instances() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
    let manager = manager_with(store.clone(), clock).await;
    let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();
    let run = manager
        .add_goal(&dream.id, GoalSpec::weekly("Run", 10))
        .await
        .unwrap();
    let swim = manager
        .add_goal(&dream.id, GoalSpec::weekly("Swim", 10))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        manager.toggle_weekly_goal(&run.id),
        manager.toggle_weekly_goal(&swim.id)
    );
    a.unwrap();
    b.unwrap();

    let stored = store.stored_week("u1", week("2025-W43"));
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|i| i.completed));
    let snapshot = manager.snapshot();
    assert!(snapshot.goal(&run.id).unwrap().1.week_log[&week("2025-W43")]);
    assert!(snapshot.goal(&swim.id).unwrap().1.week_log[&week("2025-W43")]);
    assert_eq!(snapshot.total_score, 6);
}

#[tokio::test]
async fn test_log_weekly_completion_awards_once_per_week() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
    let manager = manager_with(store.clone(), clock).await;
    let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();
    // Started Monday of 2025-W41.
    let goal = manager
        .add_goal(
            &dream.id,
            GoalSpec::weekly("Run", 3).starting(date(2025, 10, 6)),
        )
        .await
        .unwrap();

    let first = manager
        .log_weekly_completion(&goal.id, week("2025-W41"), true)
        .await
        .unwrap();
    assert_eq!(first.streak, 1);
    assert!(first.weekly_award.is_awarded());

    let second = manager
        .log_weekly_completion(&goal.id, week("2025-W42"), true)
        .await
        .unwrap();
    assert_eq!(second.streak, 2);
    assert_eq!(second.goal.weeks_remaining, 1);

    let repeat = manager
        .log_weekly_completion(&goal.id, week("2025-W42"), true)
        .await
        .unwrap();
    assert!(!repeat.weekly_award.is_awarded());

    let last = manager
        .log_weekly_completion(&goal.id, week("2025-W43"), true)
        .await
        .unwrap();
    assert_eq!(last.streak, 3);
    assert!(last.goal_completed);
    assert!(last.goal.completed);
    assert_eq!(last.milestone_award.points(), 15);

    let entries = store.scoring_entries("u1", 2025);
    assert_eq!(entries.len(), 4);
    assert_eq!(
        entries
            .iter()
            .filter(|e| e.source == ScoringSource::Milestone)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_gap_in_log_stops_the_streak() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
    let manager = manager_with(store, clock).await;
    let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();
    let goal = manager
        .add_goal(
            &dream.id,
            GoalSpec::weekly("Run", 3).starting(date(2025, 10, 6)),
        )
        .await
        .unwrap();

    for (w, done) in [("2025-W41", true), ("2025-W42", false), ("2025-W43", true)] {
        manager
            .log_weekly_completion(&goal.id, week(w), done)
            .await
            .unwrap();
    }
    let progress = manager.progress(&goal.id).unwrap();
    assert_eq!(progress.streak, 1);
    assert!(!progress.reached);
}

#[tokio::test]
async fn test_delete_goal_cascades_to_template_and_current_week() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
    let manager = manager_with(store.clone(), clock).await;
    let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();
    let run = manager
        .add_goal(&dream.id, GoalSpec::weekly("Run", 3))
        .await
        .unwrap();
    let swim = manager
        .add_goal(&dream.id, GoalSpec::weekly("Swim", 3))
        .await
        .unwrap();
    manager.toggle_weekly_goal(&run.id).await.unwrap();
    manager.toggle_weekly_goal(&swim.id).await.unwrap();

    let report = manager.delete_goal(&dream.id, &run.id).await.unwrap();
    assert_eq!(report.templates_removed, 1);
    assert_eq!(report.instances_removed, 1);
    assert!(report.week_cleanup_error.is_none());

    let stored = store.stored_collection("u1");
    assert_eq!(stored.dreams[0].goals.len(), 1);
    assert_eq!(stored.templates.len(), 1);
    assert_eq!(stored.templates[0].goal_id, swim.id);
    assert_eq!(store.stored_week("u1", week("2025-W43")).len(), 1);
    assert_eq!(manager.snapshot().instances.len(), 1);
}

#[tokio::test]
async fn test_delete_dream_cascades_everything_it_owns() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
    let manager = manager_with(store.clone(), clock).await;
    let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();
    let other = manager.add_dream(DreamSpec::new("Piano")).await.unwrap();
    let run = manager
        .add_goal(&dream.id, GoalSpec::weekly("Run", 3))
        .await
        .unwrap();
    manager.toggle_weekly_goal(&run.id).await.unwrap();
    manager
        .add_weekly_goal("Buy shoes", Some(&dream.id))
        .await
        .unwrap();
    manager
        .add_weekly_goal("Practice scales", Some(&other.id))
        .await
        .unwrap();

    let report = manager.delete_dream(&dream.id).await.unwrap();
    assert_eq!(report.goals_removed, 1);
    assert_eq!(report.templates_removed, 1);
    assert_eq!(report.instances_removed, 2);

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.dreams.len(), 1);
    assert!(snapshot.templates.is_empty());
    assert_eq!(snapshot.instances.len(), 1);
    assert_eq!(snapshot.instances[0].title, "Practice scales");
}

#[tokio::test]
async fn test_complete_dream_awards_once() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
    let manager = manager_with(store.clone(), clock).await;
    let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();

    let done = manager.complete_dream(&dream.id).await.unwrap();
    assert!(done.dream.completed);
    assert_eq!(done.award.points(), 10);
    assert!(manager.complete_dream(&dream.id).await.is_err());
    assert_eq!(store.scoring_entries("u1", 2025).len(), 1);
}

#[tokio::test]
async fn test_state_survives_reopening_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dreamgoal.db");
    let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));

    let goal_id = {
        let store = Arc::new(SqliteItemStore::open_at(&path).unwrap());
        let manager = manager_with(store, clock.clone()).await;
        let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();
        let goal = manager
            .add_goal(&dream.id, GoalSpec::weekly("Run", 3))
            .await
            .unwrap();
        manager.toggle_weekly_goal(&goal.id).await.unwrap();
        goal.id
    };

    let store = Arc::new(SqliteItemStore::open_at(&path).unwrap());
    let manager = manager_with(store, clock).await;
    let snapshot = manager.snapshot();
    let (dream, goal) = snapshot.goal(&goal_id).unwrap();
    assert_eq!(dream.title, "Marathon");
    assert!(goal.week_log[&week("2025-W43")]);
    assert_eq!(snapshot.templates.len(), 1);
    assert_eq!(snapshot.instances.len(), 1);
    assert!(snapshot.instances[0].completed);
    assert_eq!(snapshot.total_score, 3);
    assert_eq!(snapshot.scoring_entries.len(), 1);
}

#[tokio::test]
async fn test_subscribers_see_state_and_award_events() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
    let manager = manager_with(store, clock).await;
    let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();
    let goal = manager
        .add_goal(&dream.id, GoalSpec::weekly("Run", 3))
        .await
        .unwrap();

    let mut events = manager.subscribe();
    manager.toggle_weekly_goal(&goal.id).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen
        .iter()
        .any(|e| matches!(e, Event::StateChanged { change, .. } if change == "set_week_instances")));
    assert!(seen.iter().any(|e| matches!(
        e,
        Event::PointsAwarded {
            source: ScoringSource::Week,
            points: 3,
            ..
        }
    )));
}

fn week_awards(store: &MemoryStore) -> usize {
    store
        .scoring_entries("u1", 2025)
        .iter()
        .filter(|e| e.source == ScoringSource::Week)
        .count()
}

/// This week's instance completion and week-log value for `goal_id`.
fn current_week_state(manager: &GoalManager, goal_id: &str) -> (bool, Option<bool>) {
    let snapshot = manager.snapshot();
    let this_week = week("2025-W43");
    let template = snapshot.template_for_goal(goal_id).unwrap();
    let instance = snapshot
        .instance_for_template(&template.id, this_week)
        .is_some_and(|i| i.completed);
    let logged = snapshot.goal(goal_id).unwrap().1.week_log.get(&this_week).copied();
    (instance, logged)
}

#[tokio::test]
async fn test_logging_current_week_then_toggling_awards_once() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
    let manager = manager_with(store.clone(), clock).await;
    let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();
    let goal = manager
        .add_goal(&dream.id, GoalSpec::weekly("Run", 10))
        .await
        .unwrap();

    let logged = manager
        .log_weekly_completion(&goal.id, week("2025-W43"), true)
        .await
        .unwrap();
    assert!(logged.weekly_award.is_awarded());
    assert_eq!(current_week_state(&manager, &goal.id), (true, Some(true)));
    assert_eq!(store.stored_week("u1", week("2025-W43")).len(), 1);

    // The instance already shows the logged week, so this flips it back.
    let outcome = manager.toggle_weekly_goal(&goal.id).await.unwrap();
    let report = outcome.report().unwrap();
    assert!(!report.instance.completed);
    assert!(!report.weekly_award.is_awarded());
    assert_eq!(current_week_state(&manager, &goal.id), (false, Some(false)));

    assert_eq!(week_awards(&store), 1);
}

#[tokio::test]
async fn test_toggling_then_logging_current_week_awards_once() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
    let manager = manager_with(store.clone(), clock).await;
    let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();
    let goal = manager
        .add_goal(&dream.id, GoalSpec::weekly("Run", 10))
        .await
        .unwrap();

    manager.toggle_weekly_goal(&goal.id).await.unwrap();
    let writes = store.write_calls();
    let logged = manager
        .log_weekly_completion(&goal.id, week("2025-W43"), true)
        .await
        .unwrap();
    assert!(!logged.weekly_award.is_awarded());
    assert_eq!(store.write_calls(), writes);
    assert_eq!(current_week_state(&manager, &goal.id), (true, Some(true)));
    assert_eq!(week_awards(&store), 1);
}

#[tokio::test]
async fn test_log_after_untoggle_keeps_instance_and_log_in_step() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at_date(date(2025, 10, 22)));
    let manager = manager_with(store.clone(), clock).await;
    let dream = manager.add_dream(DreamSpec::new("Marathon")).await.unwrap();
    let goal = manager
        .add_goal(&dream.id, GoalSpec::weekly("Run", 10))
        .await
        .unwrap();

    manager.toggle_weekly_goal(&goal.id).await.unwrap();
    manager.toggle_weekly_goal(&goal.id).await.unwrap();
    assert_eq!(current_week_state(&manager, &goal.id), (false, Some(false)));

    manager
        .log_weekly_completion(&goal.id, week("2025-W43"), true)
        .await
        .unwrap();
    assert_eq!(current_week_state(&manager, &goal.id), (true, Some(true)));
    let stored = store.stored_week("u1", week("2025-W43"));
    assert_eq!(stored.len(), 1);
    assert!(stored[0].completed);
    // One award per false -> true transition of the week.
    assert_eq!(week_awards(&store), 2);

    // Logging a miss clears the instance too.
    manager
        .log_weekly_completion(&goal.id, week("2025-W43"), false)
        .await
        .unwrap();
    assert_eq!(current_week_state(&manager, &goal.id), (false, Some(false)));
    assert_eq!(week_awards(&store), 2);
}
