//! Tests for the reconciliation sweep over a populated store.

use std::sync::Arc;

use chrono::NaiveDate;
use rusthabit::engine::{run_sweep, CompletionEngine, FixedClock};
use rusthabit::model::{Goal, HabitKind, Schedule};
use rusthabit::storage::{Calendar, CompletionMap, Database, Habits, Repository, StreakMap};

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn populated_engine() -> (CompletionEngine, FixedClock) {
    let clock = FixedClock::on(day("2024-01-12"));
    let repo = Repository::open_in_memory().unwrap();
    let engine = CompletionEngine::new(repo, Arc::new(clock));

    let habit = engine
        .create_habit(
            "Read".to_string(),
            HabitKind::Form,
            Schedule::Daily,
            Goal::default(),
        )
        .unwrap();
    engine.mark_completed(habit.id, day("2024-01-11"), None).unwrap();
    engine.mark_completed(habit.id, day("2024-01-12"), None).unwrap();

    (engine, clock)
}

#[test]
fn test_sweep_after_normal_operations_is_clean() {
    let (engine, clock) = populated_engine();
    let report = run_sweep(engine.repository(), &clock).unwrap();
    assert!(report.is_clean(), "unexpected repairs: {report:?}");
}

#[test]
fn test_sweep_repairs_dropped_mirror_and_converges() {
    let (engine, clock) = populated_engine();
    let repo = engine.repository();

    // Simulate a partial write: the habit-side mirror lost its days
    let mut habits: Habits = repo.get().unwrap();
    habits[0].completed_dates.clear();
    repo.set(&habits).unwrap();

    let first = run_sweep(repo, &clock).unwrap();
    assert!(first.mirrors_repaired > 0);

    let habits: Habits = repo.get().unwrap();
    assert_eq!(habits[0].completed_dates.len(), 2);

    let second = run_sweep(repo, &clock).unwrap();
    assert!(second.is_clean(), "sweep did not converge: {second:?}");
}

#[test]
fn test_sweep_repairs_stale_streak_record() {
    let (engine, clock) = populated_engine();
    let repo = engine.repository();
    let habits: Habits = repo.get().unwrap();
    let habit_id = habits[0].id;

    // A stale cache claims a 40-day streak
    let mut streaks: StreakMap = repo.get().unwrap();
    streaks.get_mut(&habit_id).unwrap().current = 40;
    repo.set(&streaks).unwrap();

    run_sweep(repo, &clock).unwrap();

    let streaks: StreakMap = repo.get().unwrap();
    assert_eq!(streaks[&habit_id].current, 2);
}

#[test]
fn test_sweep_cleans_orphans_left_by_raw_deletion() {
    let (engine, clock) = populated_engine();
    let repo = engine.repository();

    // Delete the habit behind the engine's back, leaving orphans
    repo.set(&Habits::new()).unwrap();

    let report = run_sweep(repo, &clock).unwrap();
    assert!(report.orphans_removed > 0);

    let completions: CompletionMap = repo.get().unwrap();
    assert!(completions.is_empty());
    let streaks: StreakMap = repo.get().unwrap();
    assert!(streaks.is_empty());
    let calendar: Calendar = repo.get().unwrap();
    assert!(calendar.is_empty());
}

#[test]
fn test_sweep_normalizes_legacy_store() {
    // A store written by an older release: unknown units, a duplicate id,
    // and a completion set out of step with the habit mirror
    let db = Database::open_in_memory().unwrap();
    db.write_collection(
        "activities-historical",
        r#"[
            {"id": "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d", "name": "Run", "duration": 30.0,
             "unit": "mins", "day": "2024-01-09", "recorded_at": "2024-01-09T08:00:00Z"},
            {"id": "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d", "name": "Swim", "duration": 45.0,
             "unit": "laps", "day": "2024-01-10", "recorded_at": "2024-01-10T08:00:00Z"}
        ]"#,
    )
    .unwrap();
    let repo = Repository::new(db);
    let clock = FixedClock::on(day("2024-01-12"));

    let report = run_sweep(&repo, &clock).unwrap();
    assert_eq!(report.units_normalized, 1);
    assert_eq!(report.ids_reassigned, 1);

    let history: rusthabit::storage::ActivityHistory = repo.get().unwrap();
    assert_ne!(history[0].id, history[1].id);

    let second = run_sweep(&repo, &clock).unwrap();
    assert!(second.is_clean(), "sweep did not converge: {second:?}");
}
