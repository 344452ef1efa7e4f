//! Habit completion engine.
//!
//! All mutations of habit state funnel through here. Each operation applies
//! its dependent writes in a fixed order (completion, habit mirror, calendar
//! mirror, streak record) and returns only once all of them are stored; a
//! failure part-way through is surfaced so the reconciliation sweep can
//! repair the partial application later.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::engine::clock::Clock;
use crate::engine::streaks;
use crate::engine::EngineError;
use crate::model::{
    Activity, CalendarHabitEntry, Completion, CompletionStatus, Goal, Habit, HabitKind,
    HabitStatus, Schedule,
};
use crate::storage::{Calendar, CompletionMap, Habits, Repository, StreakMap, TodayBucket};

/// Engine for habit completions, streaks, and the habit lifecycle.
pub struct CompletionEngine {
    repo: Repository,
    clock: Arc<dyn Clock>,
}

impl CompletionEngine {
    /// Create an engine over the given repository and clock.
    pub fn new(repo: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Access the underlying repository.
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========== Habit lifecycle ==========

    /// Create and store a new habit.
    pub fn create_habit(
        &self,
        name: String,
        kind: HabitKind,
        schedule: Schedule,
        goal: Goal,
    ) -> Result<Habit, EngineError> {
        let habit = Habit {
            id: Uuid::new_v4(),
            name,
            kind,
            schedule,
            goal,
            status: HabitStatus::Active,
            created_at: self.clock.now(),
            completed_dates: BTreeSet::new(),
        };

        let mut habits: Habits = self.repo.get()?;
        habits.push(habit.clone());
        self.repo.set(&habits)?;

        tracing::info!(habit = %habit.id, name = %habit.name, "Created habit");
        Ok(habit)
    }

    /// Change a habit's status (pause, resume, complete).
    pub fn set_habit_status(&self, habit_id: Uuid, status: HabitStatus) -> Result<(), EngineError> {
        let mut habits: Habits = self.repo.get()?;
        let habit = habits
            .iter_mut()
            .find(|h| h.id == habit_id)
            .ok_or(EngineError::HabitNotFound(habit_id))?;

        habit.status = status;
        self.repo.set(&habits)?;
        Ok(())
    }

    /// Hard-delete a habit and cascade to everything referencing it.
    ///
    /// The cascade runs immediately, not on the next sweep: completions,
    /// the streak record, and calendar mirror entries all go with it.
    pub fn delete_habit(&self, habit_id: Uuid) -> Result<(), EngineError> {
        let mut habits: Habits = self.repo.get()?;
        let before = habits.len();
        habits.retain(|h| h.id != habit_id);
        if habits.len() == before {
            return Err(EngineError::HabitNotFound(habit_id));
        }
        self.repo.set(&habits)?;

        let removed = crate::engine::reconcile::cascade_delete(&self.repo, habit_id)?;
        tracing::info!(habit = %habit_id, removed, "Deleted habit and cascaded");
        Ok(())
    }

    // ========== Completions ==========

    /// Record a habit as completed on the given day.
    ///
    /// Days after the device-local today are rejected, not clamped: the
    /// caller is expected not to complete the future.
    pub fn mark_completed(
        &self,
        habit_id: Uuid,
        day: NaiveDate,
        note: Option<String>,
    ) -> Result<(), EngineError> {
        let today = self.clock.today();
        if day > today {
            return Err(EngineError::InvalidDate { day });
        }

        let mut habits: Habits = self.repo.get()?;
        let habit = habits
            .iter_mut()
            .find(|h| h.id == habit_id)
            .ok_or(EngineError::HabitNotFound(habit_id))?;

        let mut completions: CompletionMap = self.repo.get()?;
        let entry = completions.entry(habit_id).or_default();
        let completion = Completion {
            habit_id,
            day,
            status: CompletionStatus::Completed,
            recorded_at: self.clock.now(),
            note,
            activity_id: None,
        };
        match entry.iter_mut().find(|c| c.day == day) {
            Some(existing) => *existing = completion,
            None => entry.push(completion),
        }

        habit.completed_dates.insert(day);
        let habit_name = habit.name.clone();
        let completed_days = completed_days(entry);

        let mut calendar: Calendar = self.repo.get()?;
        let calendar_day = calendar.entry(day).or_default();
        if !calendar_day.habits.iter().any(|e| e.habit_id == habit_id) {
            calendar_day.habits.push(CalendarHabitEntry {
                habit_id,
                name: habit_name,
            });
        }

        let mut streaks: StreakMap = self.repo.get()?;
        let prior_longest = streaks.get(&habit_id).map(|r| r.longest).unwrap_or(0);
        streaks.insert(
            habit_id,
            streaks::compute_record(&completed_days, today, prior_longest),
        );

        self.repo.set(&completions)?;
        self.repo.set(&habits)?;
        self.repo.set(&calendar)?;
        self.repo.set(&streaks)?;

        tracing::debug!(habit = %habit_id, %day, "Marked completed");
        Ok(())
    }

    /// Remove a completion and all its mirrors.
    pub fn unmark_completed(&self, habit_id: Uuid, day: NaiveDate) -> Result<(), EngineError> {
        let mut habits: Habits = self.repo.get()?;
        let habit = habits
            .iter_mut()
            .find(|h| h.id == habit_id)
            .ok_or(EngineError::HabitNotFound(habit_id))?;

        let mut completions: CompletionMap = self.repo.get()?;
        let mut remaining = BTreeSet::new();
        let mut entry_empty = false;
        if let Some(entry) = completions.get_mut(&habit_id) {
            entry.retain(|c| c.day != day);
            remaining = completed_days(entry);
            entry_empty = entry.is_empty();
        }
        if entry_empty {
            completions.remove(&habit_id);
        }

        habit.completed_dates.remove(&day);

        let mut calendar: Calendar = self.repo.get()?;
        let mut day_empty = false;
        if let Some(calendar_day) = calendar.get_mut(&day) {
            calendar_day.habits.retain(|e| e.habit_id != habit_id);
            day_empty = calendar_day.is_empty();
        }
        if day_empty {
            calendar.remove(&day);
        }

        let mut streaks: StreakMap = self.repo.get()?;
        let prior_longest = streaks.get(&habit_id).map(|r| r.longest).unwrap_or(0);
        streaks.insert(
            habit_id,
            streaks::compute_record(&remaining, self.clock.today(), prior_longest),
        );

        self.repo.set(&completions)?;
        self.repo.set(&habits)?;
        self.repo.set(&calendar)?;
        self.repo.set(&streaks)?;

        tracing::debug!(habit = %habit_id, %day, "Unmarked completion");
        Ok(())
    }

    /// Record a habit as deliberately skipped on the given day.
    ///
    /// Skips never touch the completed-dates mirror, the calendar, or
    /// streaks; they only document the decision.
    pub fn skip(
        &self,
        habit_id: Uuid,
        day: NaiveDate,
        note: Option<String>,
    ) -> Result<(), EngineError> {
        let habits: Habits = self.repo.get()?;
        if !habits.iter().any(|h| h.id == habit_id) {
            return Err(EngineError::HabitNotFound(habit_id));
        }

        let mut completions: CompletionMap = self.repo.get()?;
        let entry = completions.entry(habit_id).or_default();
        let completion = Completion {
            habit_id,
            day,
            status: CompletionStatus::Skipped,
            recorded_at: self.clock.now(),
            note,
            activity_id: None,
        };
        match entry.iter_mut().find(|c| c.day == day) {
            Some(existing) => *existing = completion,
            None => entry.push(completion),
        }

        self.repo.set(&completions)?;
        Ok(())
    }

    // ========== Activities ==========

    /// Log an activity into the today bucket under its day.
    pub fn log_activity(&self, activity: Activity) -> Result<(), EngineError> {
        if let Some(habit_id) = activity.habit_id {
            let habits: Habits = self.repo.get()?;
            if !habits.iter().any(|h| h.id == habit_id) {
                return Err(EngineError::HabitNotFound(habit_id));
            }
        }

        let mut bucket: TodayBucket = self.repo.get()?;
        bucket.entry(activity.day).or_default().push(activity);
        self.repo.set(&bucket)?;
        Ok(())
    }

    /// Remove an activity from the today bucket by id.
    ///
    /// Returns whether anything was removed. Archived activities are
    /// history and stay put.
    pub fn remove_activity(&self, activity_id: Uuid) -> Result<bool, EngineError> {
        let mut bucket: TodayBucket = self.repo.get()?;
        let mut removed = false;

        bucket.retain(|_, activities| {
            let before = activities.len();
            activities.retain(|a| a.id != activity_id);
            removed |= activities.len() < before;
            !activities.is_empty()
        });

        if removed {
            self.repo.set(&bucket)?;
        }
        Ok(removed)
    }
}

/// Days with a completed-status completion, the input to streak math.
fn completed_days(completions: &[Completion]) -> BTreeSet<NaiveDate> {
    completions
        .iter()
        .filter(|c| c.status == CompletionStatus::Completed)
        .map(|c| c.day)
        .collect()
}
