//! Cross-collection reconciliation sweep.
//!
//! A convergence operation, not a migration: each pass checks one
//! invariant, repairs only the drift it finds, and is safe to skip when
//! its precondition already holds. Running the sweep twice in a row with
//! no intervening writes reports a clean second run.

use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::engine::clock::Clock;
use crate::engine::streaks;
use crate::engine::EngineError;
use crate::model::{CalendarHabitEntry, Completion, CompletionStatus};
use crate::storage::{
    ActivityHistory, Calendar, CompletionMap, Habits, Loaded, RepairKind, Repository, StreakMap,
    TodayBucket,
};

/// What the sweep repaired, per pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Habit/completion/calendar mirror entries brought back in agreement
    pub mirrors_repaired: usize,
    /// Streak records recomputed because they disagreed with completions
    pub streaks_recomputed: usize,
    /// Activities whose unit was coerced into the recognized set
    pub units_normalized: usize,
    /// Duplicate activity ids replaced with fresh ones
    pub ids_reassigned: usize,
    /// Records removed because their habit no longer exists
    pub orphans_removed: usize,
}

impl SweepReport {
    /// Whether the sweep found nothing to repair.
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Run all repair passes once.
pub fn run_sweep(repo: &Repository, clock: &dyn Clock) -> Result<SweepReport, EngineError> {
    let mut report = SweepReport::default();

    repair_mirrors(repo, clock, &mut report)?;
    normalize_units(repo, &mut report)?;
    reassign_duplicate_ids(repo, &mut report)?;
    remove_orphans(repo, &mut report)?;

    if report.is_clean() {
        tracing::debug!("Reconciliation sweep found nothing to repair");
    } else {
        tracing::info!(?report, "Reconciliation sweep applied repairs");
    }

    Ok(report)
}

/// Pass 1: per habit, union `completed_dates` with completed-status
/// completions and write the union back to both sides; restore calendar
/// mirror entries; recompute streak records from the agreed history.
fn repair_mirrors(
    repo: &Repository,
    clock: &dyn Clock,
    report: &mut SweepReport,
) -> Result<(), EngineError> {
    let mut habits: Habits = repo.get()?;
    let mut completions: CompletionMap = repo.get()?;
    let mut calendar: Calendar = repo.get()?;
    let mut streaks: StreakMap = repo.get()?;

    let today = clock.today();
    let mut habits_changed = false;
    let mut completions_changed = false;
    let mut calendar_changed = false;
    let mut streaks_changed = false;

    for habit in habits.iter_mut() {
        let entry = completions.entry(habit.id).or_default();
        let completion_days: BTreeSet<NaiveDate> = entry
            .iter()
            .filter(|c| c.status == CompletionStatus::Completed)
            .map(|c| c.day)
            .collect();

        let union: BTreeSet<NaiveDate> = habit
            .completed_dates
            .union(&completion_days)
            .copied()
            .collect();

        if habit.completed_dates != union {
            report.mirrors_repaired += union.difference(&habit.completed_dates).count();
            habit.completed_dates = union.clone();
            habits_changed = true;
        }

        for &day in union.difference(&completion_days) {
            entry.push(Completion {
                habit_id: habit.id,
                day,
                status: CompletionStatus::Completed,
                recorded_at: clock.now(),
                note: None,
                activity_id: None,
            });
            report.mirrors_repaired += 1;
            completions_changed = true;
        }

        for &day in &union {
            let calendar_day = calendar.entry(day).or_default();
            if !calendar_day.habits.iter().any(|e| e.habit_id == habit.id) {
                calendar_day.habits.push(CalendarHabitEntry {
                    habit_id: habit.id,
                    name: habit.name.clone(),
                });
                report.mirrors_repaired += 1;
                calendar_changed = true;
            }
        }

        let prior_longest = streaks.get(&habit.id).map(|r| r.longest).unwrap_or(0);
        let expected = streaks::compute_record(&union, today, prior_longest);
        if streaks.get(&habit.id) != Some(&expected) {
            streaks.insert(habit.id, expected);
            report.streaks_recomputed += 1;
            streaks_changed = true;
        }
    }

    // Empty entries materialized by `or_default` above are dropped again
    // so a clean store stays byte-identical.
    let before = completions.len();
    completions.retain(|_, entry| !entry.is_empty());
    completions_changed |= completions.len() != before;

    if habits_changed {
        repo.set(&habits)?;
    }
    if completions_changed {
        repo.set(&completions)?;
    }
    if calendar_changed {
        repo.set(&calendar)?;
    }
    if streaks_changed {
        repo.set(&streaks)?;
    }

    Ok(())
}

/// Pass 2: persist the repaired form of any activity collection whose
/// stored payload needed coercion, so units outside `{minute, hour}` are
/// normalized on disk and the next read comes back clean.
fn normalize_units(repo: &Repository, report: &mut SweepReport) -> Result<(), EngineError> {
    let bucket = repo.load::<TodayBucket>()?;
    report.units_normalized += count_unit_repairs(&bucket);
    if bucket.is_repaired() {
        repo.set(&bucket.into_value())?;
    }

    let history = repo.load::<ActivityHistory>()?;
    report.units_normalized += count_unit_repairs(&history);
    if history.is_repaired() {
        repo.set(&history.into_value())?;
    }

    let calendar = repo.load::<Calendar>()?;
    report.units_normalized += count_unit_repairs(&calendar);
    if calendar.is_repaired() {
        repo.set(&calendar.into_value())?;
    }

    Ok(())
}

fn count_unit_repairs<T>(loaded: &Loaded<T>) -> usize {
    loaded
        .warnings()
        .iter()
        .filter(|w| w.kind == RepairKind::UnitCoerced)
        .count()
}

/// Pass 3: duplicate activity ids in the historical and calendar
/// collections get fresh ids beyond the first occurrence, content
/// preserved. The two collections are separate scopes: an id appearing in
/// both is the same record mirrored, not a duplicate.
fn reassign_duplicate_ids(repo: &Repository, report: &mut SweepReport) -> Result<(), EngineError> {
    let mut history: ActivityHistory = repo.get()?;
    let mut seen = HashSet::new();
    let mut history_changed = false;
    for activity in history.iter_mut() {
        if !seen.insert(activity.id) {
            let fresh = Uuid::new_v4();
            tracing::warn!(old = %activity.id, new = %fresh, "Duplicate activity id in history");
            activity.id = fresh;
            seen.insert(fresh);
            report.ids_reassigned += 1;
            history_changed = true;
        }
    }
    if history_changed {
        repo.set(&history)?;
    }

    let mut calendar: Calendar = repo.get()?;
    let mut seen = HashSet::new();
    let mut calendar_changed = false;
    for day in calendar.values_mut() {
        for activity in day.activities.iter_mut() {
            if !seen.insert(activity.id) {
                let fresh = Uuid::new_v4();
                tracing::warn!(old = %activity.id, new = %fresh, "Duplicate activity id in calendar");
                activity.id = fresh;
                seen.insert(fresh);
                report.ids_reassigned += 1;
                calendar_changed = true;
            }
        }
    }
    if calendar_changed {
        repo.set(&calendar)?;
    }

    Ok(())
}

/// Pass 4: drop completions, streak records, and calendar habit entries
/// whose habit no longer exists.
fn remove_orphans(repo: &Repository, report: &mut SweepReport) -> Result<(), EngineError> {
    let habits: Habits = repo.get()?;
    let live: HashSet<Uuid> = habits.iter().map(|h| h.id).collect();

    let mut completions: CompletionMap = repo.get()?;
    let orphaned: Vec<Uuid> = completions
        .keys()
        .filter(|id| !live.contains(id))
        .copied()
        .collect();
    if !orphaned.is_empty() {
        for id in &orphaned {
            if let Some(entry) = completions.remove(id) {
                report.orphans_removed += entry.len();
            }
        }
        repo.set(&completions)?;
    }

    let mut streaks: StreakMap = repo.get()?;
    let before = streaks.len();
    streaks.retain(|id, _| live.contains(id));
    if streaks.len() != before {
        report.orphans_removed += before - streaks.len();
        repo.set(&streaks)?;
    }

    let mut calendar: Calendar = repo.get()?;
    let mut calendar_changed = false;
    calendar.retain(|_, day| {
        let before = day.habits.len();
        day.habits.retain(|e| live.contains(&e.habit_id));
        if day.habits.len() != before {
            report.orphans_removed += before - day.habits.len();
            calendar_changed = true;
        }
        !day.is_empty()
    });
    if calendar_changed {
        repo.set(&calendar)?;
    }

    Ok(())
}

/// Remove everything referencing a deleted habit.
///
/// Called directly on habit deletion; the periodic sweep's orphan pass is
/// the backstop, not the primary path.
pub fn cascade_delete(repo: &Repository, habit_id: Uuid) -> Result<usize, EngineError> {
    let mut removed = 0;

    let mut completions: CompletionMap = repo.get()?;
    if let Some(entry) = completions.remove(&habit_id) {
        removed += entry.len();
        repo.set(&completions)?;
    }

    let mut streaks: StreakMap = repo.get()?;
    if streaks.remove(&habit_id).is_some() {
        removed += 1;
        repo.set(&streaks)?;
    }

    let mut calendar: Calendar = repo.get()?;
    let mut calendar_changed = false;
    calendar.retain(|_, day| {
        let before = day.habits.len();
        day.habits.retain(|e| e.habit_id != habit_id);
        if day.habits.len() != before {
            removed += before - day.habits.len();
            calendar_changed = true;
        }
        !day.is_empty()
    });
    if calendar_changed {
        repo.set(&calendar)?;
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::FixedClock;
    use crate::engine::completion::CompletionEngine;
    use crate::model::{Activity, DurationUnit, Goal, Habit, HabitKind, Schedule};
    use crate::storage::Collection;
    use std::sync::Arc;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn fixture() -> (Repository, FixedClock) {
        let repo = Repository::open_in_memory().unwrap();
        (repo, FixedClock::on(day("2024-01-12")))
    }

    fn stored_habit(repo: &Repository) -> Habit {
        let habit = Habit::new(
            "Read".to_string(),
            HabitKind::Form,
            Schedule::Daily,
            Goal::default(),
        );
        repo.set(&vec![habit.clone()]).unwrap();
        habit
    }

    #[test]
    fn test_sweep_on_empty_store_is_clean() {
        let (repo, clock) = fixture();
        let report = run_sweep(&repo, &clock).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn test_mirror_union_restores_both_sides() {
        let (repo, clock) = fixture();
        let mut habit = stored_habit(&repo);

        // Habit side knows one day, completion side another
        habit.completed_dates.insert(day("2024-01-10"));
        repo.set(&vec![habit.clone()]).unwrap();

        let mut completions = CompletionMap::new();
        completions.insert(
            habit.id,
            vec![Completion::completed(habit.id, day("2024-01-11"), None)],
        );
        repo.set(&completions).unwrap();

        let report = run_sweep(&repo, &clock).unwrap();
        assert!(report.mirrors_repaired > 0);

        let habits: Habits = repo.get().unwrap();
        assert!(habits[0].completed_dates.contains(&day("2024-01-10")));
        assert!(habits[0].completed_dates.contains(&day("2024-01-11")));

        let completions: CompletionMap = repo.get().unwrap();
        let days: BTreeSet<NaiveDate> = completions[&habit.id].iter().map(|c| c.day).collect();
        assert!(days.contains(&day("2024-01-10")));

        // Streak record was rebuilt from the agreed history
        let streaks: StreakMap = repo.get().unwrap();
        assert_eq!(streaks[&habit.id].current, 2);
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let (repo, clock) = fixture();
        let habit = stored_habit(&repo);

        let engine = CompletionEngine::new(repo.clone(), Arc::new(clock));
        engine.mark_completed(habit.id, day("2024-01-11"), None).unwrap();

        // Desynchronize on purpose: drop the habit-side mirror
        let mut habits: Habits = repo.get().unwrap();
        habits[0].completed_dates.clear();
        repo.set(&habits).unwrap();

        let first = run_sweep(&repo, &clock).unwrap();
        assert!(!first.is_clean());

        let second = run_sweep(&repo, &clock).unwrap();
        assert!(second.is_clean(), "second sweep found drift: {second:?}");
    }

    #[test]
    fn test_unknown_units_normalized_on_disk() {
        // Write a raw payload with a unit outside the recognized set
        let raw = r#"[{"id": "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d", "name": "Run",
                       "duration": 30.0, "unit": "furlongs", "day": "2024-01-10",
                       "recorded_at": "2024-01-10T08:00:00Z"}]"#;
        let db = crate::storage::Database::open_in_memory().unwrap();
        db.write_collection(Collection::ActivitiesHistory.key(), raw)
            .unwrap();
        let repo = Repository::new(db);
        let clock = FixedClock::on(day("2024-01-12"));

        let report = run_sweep(&repo, &clock).unwrap();
        assert_eq!(report.units_normalized, 1);

        // Persisted form is clean now
        let loaded = repo.load::<ActivityHistory>().unwrap();
        assert!(!loaded.is_repaired());
        assert_eq!(loaded.into_value()[0].unit, DurationUnit::Minute);
    }

    #[test]
    fn test_duplicate_ids_reassigned() {
        let (repo, clock) = fixture();

        let activity = Activity::new("Run".to_string(), 30.0, DurationUnit::Minute, day("2024-01-10"));
        let mut twin = activity.clone();
        twin.name = "Run again".to_string();
        repo.set(&vec![activity.clone(), twin]).unwrap();

        let report = run_sweep(&repo, &clock).unwrap();
        assert_eq!(report.ids_reassigned, 1);

        let history: ActivityHistory = repo.get().unwrap();
        assert_ne!(history[0].id, history[1].id);
        // First occurrence keeps its id, content preserved on both
        assert_eq!(history[0].id, activity.id);
        assert_eq!(history[1].name, "Run again");
    }

    #[test]
    fn test_orphans_removed() {
        let (repo, clock) = fixture();
        let ghost = Uuid::new_v4();

        let mut completions = CompletionMap::new();
        completions.insert(ghost, vec![Completion::completed(ghost, day("2024-01-10"), None)]);
        repo.set(&completions).unwrap();

        let mut streaks = StreakMap::new();
        streaks.insert(ghost, Default::default());
        repo.set(&streaks).unwrap();

        let report = run_sweep(&repo, &clock).unwrap();
        assert_eq!(report.orphans_removed, 2);

        let completions: CompletionMap = repo.get().unwrap();
        assert!(completions.is_empty());
        let streaks: StreakMap = repo.get().unwrap();
        assert!(streaks.is_empty());
    }
}
