//! Completion, streak, calendar, and sync-cursor records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::activity::Activity;

/// A record asserting a habit was (or was not) performed on a given day.
///
/// At most one completion exists per `(habit_id, day)` pair; writing a
/// second one for the same key replaces the first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Habit the completion belongs to
    pub habit_id: Uuid,
    /// Calendar day the completion applies to
    pub day: NaiveDate,
    /// Outcome for the day
    pub status: CompletionStatus,
    /// When the completion was recorded
    pub recorded_at: DateTime<Utc>,
    /// Free-text note
    pub note: Option<String>,
    /// Linked activity, if one was logged alongside
    pub activity_id: Option<Uuid>,
}

impl Completion {
    /// Create a completed-status record for the given habit and day.
    pub fn completed(habit_id: Uuid, day: NaiveDate, note: Option<String>) -> Self {
        Self {
            habit_id,
            day,
            status: CompletionStatus::Completed,
            recorded_at: Utc::now(),
            note,
            activity_id: None,
        }
    }

    /// Create a skipped-status record for the given habit and day.
    pub fn skipped(habit_id: Uuid, day: NaiveDate, note: Option<String>) -> Self {
        Self {
            status: CompletionStatus::Skipped,
            ..Self::completed(habit_id, day, note)
        }
    }
}

/// Outcome recorded for a habit on a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    /// Habit was performed
    Completed,
    /// Habit was deliberately skipped
    Skipped,
    /// Not yet resolved
    #[default]
    Pending,
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionStatus::Completed => write!(f, "Completed"),
            CompletionStatus::Skipped => write!(f, "Skipped"),
            CompletionStatus::Pending => write!(f, "Pending"),
        }
    }
}

/// Derived streak statistics for a habit.
///
/// A pure function of the habit's completion history. Any mismatch is
/// resolved by recomputing from completions, never the reverse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakRecord {
    /// Consecutive days ending at or adjacent to today
    pub current: u32,
    /// Longest run of consecutive days ever seen
    pub longest: u32,
    /// Most recent completed day
    pub last_completed: Option<NaiveDate>,
}

/// Aggregate view of a single calendar day, for historical display.
///
/// Built by the archival process and the reconciliation sweep; never
/// hand-edited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarDay {
    /// Activities recorded for the day
    pub activities: Vec<Activity>,
    /// Habits completed on the day
    pub habits: Vec<CalendarHabitEntry>,
}

impl CalendarDay {
    /// Whether the day holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty() && self.habits.is_empty()
    }
}

/// A completed-habit entry inside a calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarHabitEntry {
    /// Habit identifier
    pub habit_id: Uuid,
    /// Habit name at the time of completion
    pub name: String,
}

/// Per-user synchronization state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Last successful push/pull pair
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Whether the initial migration to the remote mirror has completed
    pub migration_done: bool,
}
