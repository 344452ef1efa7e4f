//! Habit type definitions.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A habit tracked by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Habit {
    /// Unique identifier
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Whether the habit is formed or broken
    pub kind: HabitKind,
    /// When the habit is scheduled
    pub schedule: Schedule,
    /// Target amount per scheduled day
    pub goal: Goal,
    /// Current status
    pub status: HabitStatus,
    /// When the habit was created
    pub created_at: DateTime<Utc>,
    /// Days on which the habit was completed.
    ///
    /// Mirror of the completed-status completions for this habit; the
    /// reconciliation sweep keeps the two in agreement.
    pub completed_dates: BTreeSet<NaiveDate>,
}

impl Habit {
    /// Create a new active habit.
    pub fn new(name: String, kind: HabitKind, schedule: Schedule, goal: Goal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            kind,
            schedule,
            goal,
            status: HabitStatus::Active,
            created_at: Utc::now(),
            completed_dates: BTreeSet::new(),
        }
    }

    /// Whether the habit is currently being tracked.
    pub fn is_active(&self) -> bool {
        self.status == HabitStatus::Active
    }

    /// Whether the habit was completed on the given day.
    pub fn is_completed_on(&self, day: NaiveDate) -> bool {
        self.completed_dates.contains(&day)
    }
}

/// Direction of a habit: building a behavior up or breaking one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HabitKind {
    /// Form a new behavior
    #[default]
    Form,
    /// Break an existing behavior
    Break,
}

impl std::fmt::Display for HabitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HabitKind::Form => write!(f, "Form"),
            HabitKind::Break => write!(f, "Break"),
        }
    }
}

/// When a habit is due.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schedule {
    /// Every day
    #[default]
    Daily,
    /// On a fixed set of weekdays
    Weekly { weekdays: BTreeSet<u8> },
    /// On a fixed set of days of the month (1-31)
    Monthly { days: BTreeSet<u8> },
    /// Every N days from creation
    Interval { every_days: u32 },
}

impl Schedule {
    /// Whether the habit is due on the given day.
    ///
    /// For interval schedules the anchor is the habit's creation date.
    pub fn is_due_on(&self, day: NaiveDate, created: NaiveDate) -> bool {
        match self {
            Schedule::Daily => true,
            Schedule::Weekly { weekdays } => {
                weekdays.contains(&weekday_index(day.weekday()))
            }
            Schedule::Monthly { days } => days.contains(&(day.day() as u8)),
            Schedule::Interval { every_days } => {
                if *every_days == 0 {
                    return true;
                }
                let elapsed = (day - created).num_days();
                elapsed >= 0 && elapsed % i64::from(*every_days) == 0
            }
        }
    }
}

/// Monday-based weekday index (0 = Monday .. 6 = Sunday).
pub fn weekday_index(weekday: Weekday) -> u8 {
    weekday.num_days_from_monday() as u8
}

/// Target amount for a habit on a scheduled day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Target value
    pub value: f64,
    /// Unit the value is measured in
    pub unit: GoalUnit,
}

impl Default for Goal {
    fn default() -> Self {
        Self {
            value: 1.0,
            unit: GoalUnit::Times,
        }
    }
}

/// Unit of measurement for a habit goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalUnit {
    /// Repetitions per day
    #[default]
    Times,
    /// Minutes per day
    Minutes,
}

/// Status of a habit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HabitStatus {
    /// Habit is being tracked
    #[default]
    Active,
    /// Tracking is temporarily suspended
    Paused,
    /// Habit goal reached, kept for history
    Completed,
}

impl std::fmt::Display for HabitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HabitStatus::Active => write!(f, "Active"),
            HabitStatus::Paused => write!(f, "Paused"),
            HabitStatus::Completed => write!(f, "Completed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_new_habit_is_active() {
        let habit = Habit::new(
            "Read".to_string(),
            HabitKind::Form,
            Schedule::Daily,
            Goal::default(),
        );

        assert!(habit.is_active());
        assert!(habit.completed_dates.is_empty());
    }

    #[test]
    fn test_daily_schedule_always_due() {
        let created = day("2024-01-01");
        assert!(Schedule::Daily.is_due_on(day("2024-01-01"), created));
        assert!(Schedule::Daily.is_due_on(day("2024-06-15"), created));
    }

    #[test]
    fn test_weekly_schedule() {
        // Monday (0) and Friday (4)
        let schedule = Schedule::Weekly {
            weekdays: [0u8, 4u8].into_iter().collect(),
        };
        let created = day("2024-01-01");

        // 2024-01-01 is a Monday, 2024-01-05 a Friday, 2024-01-03 a Wednesday
        assert!(schedule.is_due_on(day("2024-01-01"), created));
        assert!(schedule.is_due_on(day("2024-01-05"), created));
        assert!(!schedule.is_due_on(day("2024-01-03"), created));
    }

    #[test]
    fn test_monthly_schedule() {
        let schedule = Schedule::Monthly {
            days: [1u8, 15u8].into_iter().collect(),
        };
        let created = day("2024-01-01");

        assert!(schedule.is_due_on(day("2024-02-01"), created));
        assert!(schedule.is_due_on(day("2024-03-15"), created));
        assert!(!schedule.is_due_on(day("2024-02-20"), created));
    }

    #[test]
    fn test_interval_schedule() {
        let schedule = Schedule::Interval { every_days: 3 };
        let created = day("2024-01-01");

        assert!(schedule.is_due_on(day("2024-01-01"), created));
        assert!(schedule.is_due_on(day("2024-01-04"), created));
        assert!(!schedule.is_due_on(day("2024-01-02"), created));
        // Before creation is never due
        assert!(!schedule.is_due_on(day("2023-12-31"), created));
    }
}
