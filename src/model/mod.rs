//! Domain types shared across the storage, engine, and sync layers.

pub mod activity;
pub mod habit;
pub mod tracking;

pub use activity::{Activity, DurationUnit};
pub use habit::{Goal, GoalUnit, Habit, HabitKind, HabitStatus, Schedule};
pub use tracking::{
    CalendarDay, CalendarHabitEntry, Completion, CompletionStatus, StreakRecord, SyncCursor,
};
