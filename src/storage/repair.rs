//! Field-by-field coercion of malformed collection payloads.
//!
//! Strict deserialization is always tried first; these functions are the
//! fallback path. They never fail: every input, down to a payload that is
//! not JSON at all, is coerced into a well-typed value, with one
//! [`RepairWarning`] recorded per default applied or record dropped.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::model::{
    Activity, CalendarDay, CalendarHabitEntry, Completion, CompletionStatus, DurationUnit, Goal,
    GoalUnit, Habit, HabitKind, HabitStatus, Schedule, StreakRecord, SyncCursor,
};

/// A single repair applied while coercing a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairWarning {
    /// What category of repair was applied
    pub kind: RepairKind,
    /// Human-readable description, for the log
    pub detail: String,
}

impl RepairWarning {
    fn new(kind: RepairKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Category of a repair action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairKind {
    /// A required field was absent and a default was filled in
    MissingField,
    /// A field value could not be parsed and a default was filled in
    InvalidField,
    /// A duration unit outside the recognized set was coerced to minutes
    UnitCoerced,
    /// An id could not be parsed and a fresh one was generated
    IdRegenerated,
    /// A record was unusable and dropped
    RecordDropped,
    /// The whole payload was unusable and replaced by the empty value
    PayloadReset,
}

// ========== Collection coercers ==========

/// Coerce a habits payload into a typed list.
pub fn repair_habits(value: Value, warnings: &mut Vec<RepairWarning>) -> Vec<Habit> {
    as_array(value, "habits", warnings)
        .into_iter()
        .map(|item| repair_habit(item, warnings))
        .collect()
}

fn repair_habit(value: Value, warnings: &mut Vec<RepairWarning>) -> Habit {
    let obj = as_object(value, "habit", warnings);

    let id = repair_uuid(obj.get("id"), "habit.id", warnings);
    let name = match obj.get("name").and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None => {
            warnings.push(RepairWarning::new(
                RepairKind::MissingField,
                format!("habit {id} has no name"),
            ));
            "Untitled habit".to_string()
        }
    };

    let kind = match obj.get("kind").and_then(Value::as_str) {
        Some("form") => HabitKind::Form,
        Some("break") => HabitKind::Break,
        other => {
            warn_field(warnings, other, "habit.kind", "form");
            HabitKind::Form
        }
    };

    let schedule = match obj.get("schedule") {
        Some(raw) => serde_json::from_value::<Schedule>(raw.clone()).unwrap_or_else(|_| {
            warnings.push(RepairWarning::new(
                RepairKind::InvalidField,
                format!("habit {id} schedule is malformed, using daily"),
            ));
            Schedule::Daily
        }),
        None => {
            warnings.push(RepairWarning::new(
                RepairKind::MissingField,
                format!("habit {id} has no schedule, using daily"),
            ));
            Schedule::Daily
        }
    };

    let goal = repair_goal(obj.get("goal"), &id, warnings);

    let status = match obj.get("status").and_then(Value::as_str) {
        Some("active") => HabitStatus::Active,
        Some("paused") => HabitStatus::Paused,
        Some("completed") => HabitStatus::Completed,
        other => {
            warn_field(warnings, other, "habit.status", "active");
            HabitStatus::Active
        }
    };

    let created_at = repair_timestamp(obj.get("created_at"), "habit.created_at", warnings);

    let mut completed_dates = BTreeSet::new();
    if let Some(days) = obj.get("completed_dates").and_then(Value::as_array) {
        for raw in days {
            match raw.as_str().and_then(parse_day) {
                Some(day) => {
                    completed_dates.insert(day);
                }
                None => warnings.push(RepairWarning::new(
                    RepairKind::RecordDropped,
                    format!("habit {id} completed date {raw} is not a day, dropped"),
                )),
            }
        }
    }

    Habit {
        id,
        name,
        kind,
        schedule,
        goal,
        status,
        created_at,
        completed_dates,
    }
}

fn repair_goal(value: Option<&Value>, habit_id: &Uuid, warnings: &mut Vec<RepairWarning>) -> Goal {
    let Some(obj) = value.and_then(Value::as_object) else {
        warnings.push(RepairWarning::new(
            RepairKind::MissingField,
            format!("habit {habit_id} has no goal, using default"),
        ));
        return Goal::default();
    };

    let value = obj.get("value").and_then(Value::as_f64).unwrap_or_else(|| {
        warnings.push(RepairWarning::new(
            RepairKind::InvalidField,
            format!("habit {habit_id} goal value is not numeric, using 1"),
        ));
        1.0
    });

    let unit = match obj.get("unit").and_then(Value::as_str) {
        Some("times") => GoalUnit::Times,
        Some("minutes") => GoalUnit::Minutes,
        other => {
            warn_field(warnings, other, "goal.unit", "times");
            GoalUnit::Times
        }
    };

    Goal { value, unit }
}

/// Coerce a completions payload (map of habit id to list) into typed form.
pub fn repair_completions(
    value: Value,
    warnings: &mut Vec<RepairWarning>,
) -> BTreeMap<Uuid, Vec<Completion>> {
    let mut out: BTreeMap<Uuid, Vec<Completion>> = BTreeMap::new();

    for (key, list) in as_map(value, "completions", warnings) {
        let Some(habit_id) = Uuid::parse_str(&key).ok() else {
            warnings.push(RepairWarning::new(
                RepairKind::RecordDropped,
                format!("completions key {key} is not a habit id, entry dropped"),
            ));
            continue;
        };

        let mut completions = Vec::new();
        for item in as_array(list, "completions entry", warnings) {
            if let Some(completion) = repair_completion(item, habit_id, warnings) {
                completions.push(completion);
            }
        }
        out.insert(habit_id, completions);
    }

    out
}

fn repair_completion(
    value: Value,
    habit_id: Uuid,
    warnings: &mut Vec<RepairWarning>,
) -> Option<Completion> {
    let obj = as_object(value, "completion", warnings);

    // A completion without a parseable day has no identity; drop it.
    let Some(day) = obj.get("day").and_then(Value::as_str).and_then(parse_day) else {
        warnings.push(RepairWarning::new(
            RepairKind::RecordDropped,
            format!("completion for habit {habit_id} has no usable day, dropped"),
        ));
        return None;
    };

    let status = match obj.get("status").and_then(Value::as_str) {
        Some("completed") => CompletionStatus::Completed,
        Some("skipped") => CompletionStatus::Skipped,
        Some("pending") => CompletionStatus::Pending,
        other => {
            warn_field(warnings, other, "completion.status", "pending");
            CompletionStatus::Pending
        }
    };

    let recorded_at = repair_timestamp(obj.get("recorded_at"), "completion.recorded_at", warnings);

    let activity_id = match obj.get("activity_id") {
        None | Some(Value::Null) => None,
        Some(raw) => match raw.as_str().and_then(|s| Uuid::parse_str(s).ok()) {
            Some(id) => Some(id),
            None => {
                warnings.push(RepairWarning::new(
                    RepairKind::InvalidField,
                    format!("completion {habit_id}/{day} activity link is malformed, cleared"),
                ));
                None
            }
        },
    };

    Some(Completion {
        habit_id,
        day,
        status,
        recorded_at,
        note: obj.get("note").and_then(Value::as_str).map(str::to_string),
        activity_id,
    })
}

/// Coerce a flat activity list (the historical collection).
pub fn repair_activities(value: Value, warnings: &mut Vec<RepairWarning>) -> Vec<Activity> {
    as_array(value, "activities", warnings)
        .into_iter()
        .filter_map(|item| repair_activity(item, None, warnings))
        .collect()
}

/// Coerce the today bucket (map of day to activity list).
pub fn repair_today_bucket(
    value: Value,
    warnings: &mut Vec<RepairWarning>,
) -> BTreeMap<NaiveDate, Vec<Activity>> {
    let mut out: BTreeMap<NaiveDate, Vec<Activity>> = BTreeMap::new();

    for (key, list) in as_map(value, "activities-today", warnings) {
        let Some(day) = parse_day(&key) else {
            warnings.push(RepairWarning::new(
                RepairKind::RecordDropped,
                format!("today bucket key {key} is not a day, entry dropped"),
            ));
            continue;
        };

        let activities = as_array(list, "today bucket entry", warnings)
            .into_iter()
            .filter_map(|item| repair_activity(item, Some(day), warnings))
            .collect();
        out.insert(day, activities);
    }

    out
}

/// Coerce the calendar aggregate (map of day to activities + habit entries).
pub fn repair_calendar(
    value: Value,
    warnings: &mut Vec<RepairWarning>,
) -> BTreeMap<NaiveDate, CalendarDay> {
    let mut out: BTreeMap<NaiveDate, CalendarDay> = BTreeMap::new();

    for (key, entry) in as_map(value, "calendar", warnings) {
        let Some(day) = parse_day(&key) else {
            warnings.push(RepairWarning::new(
                RepairKind::RecordDropped,
                format!("calendar key {key} is not a day, entry dropped"),
            ));
            continue;
        };

        let obj = as_object(entry, "calendar day", warnings);

        let activities = obj
            .get("activities")
            .cloned()
            .map(|raw| as_array(raw, "calendar activities", warnings))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| repair_activity(item, Some(day), warnings))
            .collect();

        let mut habits = Vec::new();
        if let Some(entries) = obj.get("habits").and_then(Value::as_array) {
            for raw in entries {
                let entry_obj = as_object(raw.clone(), "calendar habit entry", warnings);
                let Some(habit_id) = entry_obj
                    .get("habit_id")
                    .and_then(Value::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok())
                else {
                    warnings.push(RepairWarning::new(
                        RepairKind::RecordDropped,
                        format!("calendar {day} habit entry has no habit id, dropped"),
                    ));
                    continue;
                };
                let name = entry_obj
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                habits.push(CalendarHabitEntry { habit_id, name });
            }
        }

        out.insert(day, CalendarDay { activities, habits });
    }

    out
}

fn repair_activity(
    value: Value,
    fallback_day: Option<NaiveDate>,
    warnings: &mut Vec<RepairWarning>,
) -> Option<Activity> {
    let obj = as_object(value, "activity", warnings);

    let id = repair_uuid(obj.get("id"), "activity.id", warnings);

    let day = match obj.get("day").and_then(Value::as_str).and_then(parse_day) {
        Some(day) => day,
        None => match fallback_day {
            Some(day) => {
                warnings.push(RepairWarning::new(
                    RepairKind::MissingField,
                    format!("activity {id} has no usable day, using its bucket day {day}"),
                ));
                day
            }
            None => {
                warnings.push(RepairWarning::new(
                    RepairKind::RecordDropped,
                    format!("activity {id} has no usable day, dropped"),
                ));
                return None;
            }
        },
    };

    let name = match obj.get("name").and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None => {
            warnings.push(RepairWarning::new(
                RepairKind::MissingField,
                format!("activity {id} has no name"),
            ));
            "Untitled activity".to_string()
        }
    };

    let duration = obj
        .get("duration")
        .and_then(Value::as_f64)
        .unwrap_or_else(|| {
            warnings.push(RepairWarning::new(
                RepairKind::InvalidField,
                format!("activity {id} duration is not numeric, using 0"),
            ));
            0.0
        });

    let unit = repair_duration_unit(obj.get("unit"), &id, warnings);

    let habit_id = match obj.get("habit_id") {
        None | Some(Value::Null) => None,
        Some(raw) => match raw.as_str().and_then(|s| Uuid::parse_str(s).ok()) {
            Some(id) => Some(id),
            None => {
                warnings.push(RepairWarning::new(
                    RepairKind::InvalidField,
                    format!("activity {id} habit link is malformed, cleared"),
                ));
                None
            }
        },
    };

    Some(Activity {
        id,
        name,
        duration,
        unit,
        category: obj
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        color: obj
            .get("color")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        day,
        notes: obj.get("notes").and_then(Value::as_str).map(str::to_string),
        recorded_at: repair_timestamp(obj.get("recorded_at"), "activity.recorded_at", warnings),
        habit_id,
    })
}

/// Recognize a duration unit, including legacy spellings; anything else
/// is coerced to minutes.
fn repair_duration_unit(
    value: Option<&Value>,
    activity_id: &Uuid,
    warnings: &mut Vec<RepairWarning>,
) -> DurationUnit {
    let raw = value.and_then(Value::as_str);
    match raw.map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("minute") => DurationUnit::Minute,
        Some("hour") => DurationUnit::Hour,
        // Legacy spellings from older exports
        Some("min" | "mins" | "minutes") => DurationUnit::Minute,
        Some("hr" | "hrs" | "hours") => DurationUnit::Hour,
        Some(other) => {
            warnings.push(RepairWarning::new(
                RepairKind::UnitCoerced,
                format!("activity {activity_id} unit {other:?} is not recognized, using minute"),
            ));
            DurationUnit::Minute
        }
        None => {
            warnings.push(RepairWarning::new(
                RepairKind::UnitCoerced,
                format!("activity {activity_id} has no unit, using minute"),
            ));
            DurationUnit::Minute
        }
    }
}

/// Coerce the streaks payload (map of habit id to record).
pub fn repair_streaks(
    value: Value,
    warnings: &mut Vec<RepairWarning>,
) -> BTreeMap<Uuid, StreakRecord> {
    let mut out = BTreeMap::new();

    for (key, entry) in as_map(value, "streaks", warnings) {
        let Some(habit_id) = Uuid::parse_str(&key).ok() else {
            warnings.push(RepairWarning::new(
                RepairKind::RecordDropped,
                format!("streaks key {key} is not a habit id, entry dropped"),
            ));
            continue;
        };

        let obj = as_object(entry, "streak record", warnings);
        let current = repair_count(obj.get("current"), "streak.current", warnings);
        let longest = repair_count(obj.get("longest"), "streak.longest", warnings);
        let last_completed = obj
            .get("last_completed")
            .and_then(Value::as_str)
            .and_then(parse_day);

        out.insert(
            habit_id,
            StreakRecord {
                current,
                longest,
                last_completed,
            },
        );
    }

    out
}

/// Coerce the sync cursor payload.
pub fn repair_cursor(value: Value, warnings: &mut Vec<RepairWarning>) -> SyncCursor {
    let obj = as_object(value, "sync cursor", warnings);

    let last_synced_at = match obj.get("last_synced_at") {
        None | Some(Value::Null) => None,
        Some(raw) => match raw
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        {
            Some(ts) => Some(ts.with_timezone(&Utc)),
            None => {
                warnings.push(RepairWarning::new(
                    RepairKind::InvalidField,
                    "sync cursor timestamp is malformed, cleared".to_string(),
                ));
                None
            }
        },
    };

    SyncCursor {
        last_synced_at,
        migration_done: obj
            .get("migration_done")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

// ========== Shared field helpers ==========

fn as_array(value: Value, what: &str, warnings: &mut Vec<RepairWarning>) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => {
            warnings.push(RepairWarning::new(
                RepairKind::PayloadReset,
                format!("{what} payload is {} rather than a list, reset", json_type(&other)),
            ));
            Vec::new()
        }
    }
}

fn as_map(
    value: Value,
    what: &str,
    warnings: &mut Vec<RepairWarning>,
) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            warnings.push(RepairWarning::new(
                RepairKind::PayloadReset,
                format!("{what} payload is {} rather than a map, reset", json_type(&other)),
            ));
            serde_json::Map::new()
        }
    }
}

fn as_object(
    value: Value,
    what: &str,
    warnings: &mut Vec<RepairWarning>,
) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            warnings.push(RepairWarning::new(
                RepairKind::InvalidField,
                format!("{what} record is {} rather than a map", json_type(&other)),
            ));
            serde_json::Map::new()
        }
    }
}

fn repair_uuid(value: Option<&Value>, field: &str, warnings: &mut Vec<RepairWarning>) -> Uuid {
    match value.and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok()) {
        Some(id) => id,
        None => {
            let fresh = Uuid::new_v4();
            warnings.push(RepairWarning::new(
                RepairKind::IdRegenerated,
                format!("{field} is missing or malformed, generated {fresh}"),
            ));
            fresh
        }
    }
}

fn repair_timestamp(
    value: Option<&Value>,
    field: &str,
    warnings: &mut Vec<RepairWarning>,
) -> DateTime<Utc> {
    match value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    {
        Some(ts) => ts.with_timezone(&Utc),
        None => {
            warnings.push(RepairWarning::new(
                RepairKind::MissingField,
                format!("{field} is missing or malformed, using now"),
            ));
            Utc::now()
        }
    }
}

fn repair_count(value: Option<&Value>, field: &str, warnings: &mut Vec<RepairWarning>) -> u32 {
    match value.and_then(Value::as_u64) {
        Some(n) => u32::try_from(n).unwrap_or(u32::MAX),
        None => {
            warnings.push(RepairWarning::new(
                RepairKind::InvalidField,
                format!("{field} is not a count, using 0"),
            ));
            0
        }
    }
}

fn warn_field(
    warnings: &mut Vec<RepairWarning>,
    raw: Option<&str>,
    field: &str,
    default: &str,
) {
    let (kind, detail) = match raw {
        Some(other) => (
            RepairKind::InvalidField,
            format!("{field} value {other:?} is not recognized, using {default}"),
        ),
        None => (
            RepairKind::MissingField,
            format!("{field} is missing, using {default}"),
        ),
    };
    warnings.push(RepairWarning::new(kind, detail));
}

fn parse_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_habit_defaults_filled() {
        let mut warnings = Vec::new();
        let habits = repair_habits(
            json!([{ "id": "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d", "name": "Read" }]),
            &mut warnings,
        );

        assert_eq!(habits.len(), 1);
        assert_eq!(habits[0].status, HabitStatus::Active);
        assert_eq!(habits[0].kind, HabitKind::Form);
        assert_eq!(habits[0].schedule, Schedule::Daily);
        assert!(!warnings.is_empty());
    }

    #[test]
    fn test_habit_bad_id_regenerated() {
        let mut warnings = Vec::new();
        let habits = repair_habits(json!([{ "id": "not-a-uuid", "name": "Read" }]), &mut warnings);

        assert_eq!(habits.len(), 1);
        assert!(warnings
            .iter()
            .any(|w| w.kind == RepairKind::IdRegenerated));
    }

    #[test]
    fn test_legacy_unit_spellings() {
        let mut warnings = Vec::new();
        let acts = repair_activities(
            json!([
                { "id": "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d", "name": "Run",
                  "duration": 30, "unit": "mins", "day": "2024-01-10" },
                { "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7", "name": "Swim",
                  "duration": 1, "unit": "hrs", "day": "2024-01-10" },
            ]),
            &mut warnings,
        );

        assert_eq!(acts[0].unit, DurationUnit::Minute);
        assert_eq!(acts[1].unit, DurationUnit::Hour);
        // Legacy spellings are recognized, not warned
        assert!(warnings.iter().all(|w| w.kind != RepairKind::UnitCoerced));
    }

    #[test]
    fn test_unknown_unit_coerced_to_minute() {
        let mut warnings = Vec::new();
        let acts = repair_activities(
            json!([{ "id": "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d", "name": "Run",
                     "duration": 30, "unit": "furlongs", "day": "2024-01-10" }]),
            &mut warnings,
        );

        assert_eq!(acts[0].unit, DurationUnit::Minute);
        assert!(warnings.iter().any(|w| w.kind == RepairKind::UnitCoerced));
    }

    #[test]
    fn test_completion_without_day_dropped() {
        let mut warnings = Vec::new();
        let map = repair_completions(
            json!({ "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d": [
                { "status": "completed" },
                { "status": "completed", "day": "2024-01-10" },
            ]}),
            &mut warnings,
        );

        let completions = map.values().next().unwrap();
        assert_eq!(completions.len(), 1);
        assert!(warnings.iter().any(|w| w.kind == RepairKind::RecordDropped));
    }

    #[test]
    fn test_today_bucket_activity_inherits_bucket_day() {
        let mut warnings = Vec::new();
        let bucket = repair_today_bucket(
            json!({ "2024-01-10": [
                { "id": "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d", "name": "Run", "duration": 30,
                  "unit": "minute" }
            ]}),
            &mut warnings,
        );

        let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(bucket[&day][0].day, day);
    }

    #[test]
    fn test_garbage_payload_resets() {
        let mut warnings = Vec::new();
        let habits = repair_habits(json!("not a list"), &mut warnings);
        assert!(habits.is_empty());
        assert!(warnings.iter().any(|w| w.kind == RepairKind::PayloadReset));
    }

    #[test]
    fn test_cursor_bad_timestamp_cleared() {
        let mut warnings = Vec::new();
        let cursor = repair_cursor(
            json!({ "last_synced_at": "yesterday-ish", "migration_done": true }),
            &mut warnings,
        );

        assert!(cursor.last_synced_at.is_none());
        assert!(cursor.migration_done);
        assert!(warnings.iter().any(|w| w.kind == RepairKind::InvalidField));
    }
}
