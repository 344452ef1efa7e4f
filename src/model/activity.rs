//! Activity type definitions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A logged activity for a calendar day.
///
/// Activities live in the today bucket until the archival process moves
/// them into the historical collection and the calendar aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Unique identifier (store-wide, not per day)
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Duration value, interpreted via `unit`
    pub duration: f64,
    /// Unit for `duration`
    pub unit: DurationUnit,
    /// User-chosen category
    pub category: String,
    /// Display color (hex string)
    pub color: String,
    /// Calendar day the activity belongs to
    pub day: NaiveDate,
    /// Free-text notes
    pub notes: Option<String>,
    /// When the activity was recorded
    pub recorded_at: DateTime<Utc>,
    /// Habit this activity was logged against, if any
    pub habit_id: Option<Uuid>,
}

impl Activity {
    /// Create a new activity for the given day.
    pub fn new(name: String, duration: f64, unit: DurationUnit, day: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            duration,
            unit,
            category: String::new(),
            color: String::new(),
            day,
            notes: None,
            recorded_at: Utc::now(),
            habit_id: None,
        }
    }

    /// Duration expressed in minutes.
    pub fn duration_minutes(&self) -> f64 {
        match self.unit {
            DurationUnit::Minute => self.duration,
            DurationUnit::Hour => self.duration * 60.0,
        }
    }
}

/// Unit of measurement for an activity duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    /// Minutes
    #[default]
    Minute,
    /// Hours
    Hour,
}

impl std::fmt::Display for DurationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DurationUnit::Minute => write!(f, "minute"),
            DurationUnit::Hour => write!(f, "hour"),
        }
    }
}
