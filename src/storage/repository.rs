//! Typed, defensive access to the named collections.
//!
//! Every read goes through strict-then-repair deserialization: a payload
//! that parses cleanly is returned as [`Loaded::Clean`]; anything else is
//! coerced field by field into a usable value and returned as
//! [`Loaded::Repaired`] together with the repairs applied. A missing
//! collection yields its empty value. Reads never fail on malformed data,
//! only on storage I/O itself.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::events::DataChanged;
use crate::model::{Activity, CalendarDay, Completion, Habit, StreakRecord, SyncCursor};
use crate::storage::database::{Database, DatabaseError};
use crate::storage::repair::{self, RepairWarning};

/// All habits, in creation order.
pub type Habits = Vec<Habit>;
/// Completions per habit.
pub type CompletionMap = BTreeMap<Uuid, Vec<Completion>>;
/// Current-day activity buckets, keyed by day.
pub type TodayBucket = BTreeMap<NaiveDate, Vec<Activity>>;
/// Historical activity log, append-only.
pub type ActivityHistory = Vec<Activity>;
/// Calendar aggregates, keyed by day.
pub type Calendar = BTreeMap<NaiveDate, CalendarDay>;
/// Streak records per habit.
pub type StreakMap = BTreeMap<Uuid, StreakRecord>;

/// The named collections of the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Habits,
    Completions,
    ActivitiesToday,
    ActivitiesHistory,
    Calendar,
    Streaks,
    SyncCursor,
    Settings,
    Reflections,
    CycleData,
}

impl Collection {
    /// Stable storage key, unchanged across the lifetime of an install.
    pub fn key(&self) -> &'static str {
        match self {
            Collection::Habits => "habits",
            Collection::Completions => "completions",
            Collection::ActivitiesToday => "activities-today",
            Collection::ActivitiesHistory => "activities-historical",
            Collection::Calendar => "calendar",
            Collection::Streaks => "streaks",
            Collection::SyncCursor => "sync-cursor",
            Collection::Settings => "settings",
            Collection::Reflections => "reflections",
            Collection::CycleData => "cycle-data",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Result of a defensive read.
#[derive(Debug, Clone)]
pub enum Loaded<T> {
    /// Payload parsed strictly, no repairs needed
    Clean(T),
    /// Payload was coerced; the repairs applied ride along
    Repaired(T, Vec<RepairWarning>),
}

impl<T> Loaded<T> {
    /// The value, discarding repair information.
    pub fn into_value(self) -> T {
        match self {
            Loaded::Clean(value) => value,
            Loaded::Repaired(value, _) => value,
        }
    }

    /// Whether any repair was applied.
    pub fn is_repaired(&self) -> bool {
        matches!(self, Loaded::Repaired(..))
    }

    /// The repairs applied, empty for a clean read.
    pub fn warnings(&self) -> &[RepairWarning] {
        match self {
            Loaded::Clean(_) => &[],
            Loaded::Repaired(_, warnings) => warnings,
        }
    }
}

/// A typed collection value the repository knows how to load and repair.
pub trait CollectionValue: Serialize + DeserializeOwned {
    /// Which collection this type is stored under.
    const COLLECTION: Collection;

    /// The value of a collection that does not exist yet.
    fn empty() -> Self;

    /// Coerce a malformed payload into a usable value.
    fn repair(value: Value, warnings: &mut Vec<RepairWarning>) -> Self;
}

impl CollectionValue for Habits {
    const COLLECTION: Collection = Collection::Habits;

    fn empty() -> Self {
        Vec::new()
    }

    fn repair(value: Value, warnings: &mut Vec<RepairWarning>) -> Self {
        repair::repair_habits(value, warnings)
    }
}

impl CollectionValue for CompletionMap {
    const COLLECTION: Collection = Collection::Completions;

    fn empty() -> Self {
        BTreeMap::new()
    }

    fn repair(value: Value, warnings: &mut Vec<RepairWarning>) -> Self {
        repair::repair_completions(value, warnings)
    }
}

impl CollectionValue for TodayBucket {
    const COLLECTION: Collection = Collection::ActivitiesToday;

    fn empty() -> Self {
        BTreeMap::new()
    }

    fn repair(value: Value, warnings: &mut Vec<RepairWarning>) -> Self {
        repair::repair_today_bucket(value, warnings)
    }
}

impl CollectionValue for ActivityHistory {
    const COLLECTION: Collection = Collection::ActivitiesHistory;

    fn empty() -> Self {
        Vec::new()
    }

    fn repair(value: Value, warnings: &mut Vec<RepairWarning>) -> Self {
        repair::repair_activities(value, warnings)
    }
}

impl CollectionValue for Calendar {
    const COLLECTION: Collection = Collection::Calendar;

    fn empty() -> Self {
        BTreeMap::new()
    }

    fn repair(value: Value, warnings: &mut Vec<RepairWarning>) -> Self {
        repair::repair_calendar(value, warnings)
    }
}

impl CollectionValue for StreakMap {
    const COLLECTION: Collection = Collection::Streaks;

    fn empty() -> Self {
        BTreeMap::new()
    }

    fn repair(value: Value, warnings: &mut Vec<RepairWarning>) -> Self {
        repair::repair_streaks(value, warnings)
    }
}

impl CollectionValue for SyncCursor {
    const COLLECTION: Collection = Collection::SyncCursor;

    fn empty() -> Self {
        SyncCursor::default()
    }

    fn repair(value: Value, warnings: &mut Vec<RepairWarning>) -> Self {
        repair::repair_cursor(value, warnings)
    }
}

/// Storage-layer errors surfaced to callers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

struct Inner {
    db: Mutex<Database>,
    events: broadcast::Sender<DataChanged>,
}

/// Handle to the local store. Cheap to clone; all clones share the
/// underlying database. The repository is the sole writer of on-disk
/// representations; every other component reads and writes through it.
#[derive(Clone)]
pub struct Repository {
    inner: Arc<Inner>,
}

impl Repository {
    /// Wrap an open database.
    pub fn new(db: Database) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                db: Mutex::new(db),
                events,
            }),
        }
    }

    /// Open a repository over an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<DataChanged> {
        self.inner.events.subscribe()
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.inner.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read a collection, reporting whether repairs were applied.
    pub fn load<T: CollectionValue>(&self) -> Result<Loaded<T>, StoreError> {
        let raw = self.db().read_collection(T::COLLECTION.key())?;

        let Some(raw) = raw else {
            return Ok(Loaded::Clean(T::empty()));
        };

        if let Ok(value) = serde_json::from_str::<T>(&raw) {
            return Ok(Loaded::Clean(value));
        }

        let mut warnings = Vec::new();
        let value = match serde_json::from_str::<Value>(&raw) {
            Ok(value) => value,
            Err(e) => {
                warnings.push(RepairWarning {
                    kind: repair::RepairKind::PayloadReset,
                    detail: format!("payload is not JSON ({e}), reset"),
                });
                Value::Null
            }
        };

        let repaired = T::repair(value, &mut warnings);
        Ok(Loaded::Repaired(repaired, warnings))
    }

    /// Read a collection, logging any repairs and returning the value.
    ///
    /// This is the everyday read path: malformed data is repaired to a
    /// usable value and reported as warnings, never as an error.
    pub fn get<T: CollectionValue>(&self) -> Result<T, StoreError> {
        let loaded = self.load::<T>()?;
        for warning in loaded.warnings() {
            tracing::warn!(
                collection = T::COLLECTION.key(),
                kind = ?warning.kind,
                "repaired stored record: {}",
                warning.detail
            );
        }
        Ok(loaded.into_value())
    }

    /// Write a collection and notify subscribers.
    pub fn set<T: CollectionValue>(&self, value: &T) -> Result<(), StoreError> {
        let payload = serde_json::to_string(value)?;
        self.db().write_collection(T::COLLECTION.key(), &payload)?;
        self.notify(T::COLLECTION);
        Ok(())
    }

    /// Read a passthrough collection as raw JSON.
    ///
    /// Settings, reflections, and cycle data ride along in push/pull but
    /// are never interpreted by the core.
    pub fn get_passthrough(&self, collection: Collection) -> Result<Value, StoreError> {
        let raw = self.db().read_collection(collection.key())?;
        match raw {
            None => Ok(Value::Null),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(value),
                Err(e) => {
                    tracing::warn!(
                        collection = collection.key(),
                        "passthrough payload is not JSON ({e}), reset"
                    );
                    Ok(Value::Null)
                }
            },
        }
    }

    /// Write a passthrough collection and notify subscribers.
    pub fn set_passthrough(&self, collection: Collection, value: &Value) -> Result<(), StoreError> {
        let payload = serde_json::to_string(value)?;
        self.db().write_collection(collection.key(), &payload)?;
        self.notify(collection);
        Ok(())
    }

    fn notify(&self, collection: Collection) {
        // No receivers is fine; the signal is best-effort.
        let _ = self.inner.events.send(DataChanged { collection });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Goal, HabitKind, Schedule};

    #[test]
    fn test_missing_collection_yields_empty() {
        let repo = Repository::open_in_memory().unwrap();
        let habits: Habits = repo.get().unwrap();
        assert!(habits.is_empty());

        let loaded = repo.load::<Habits>().unwrap();
        assert!(!loaded.is_repaired());
    }

    #[test]
    fn test_round_trip_is_clean() {
        let repo = Repository::open_in_memory().unwrap();
        let habits = vec![Habit::new(
            "Read".to_string(),
            HabitKind::Form,
            Schedule::Daily,
            Goal::default(),
        )];
        repo.set(&habits).unwrap();

        let loaded = repo.load::<Habits>().unwrap();
        assert!(!loaded.is_repaired());
        assert_eq!(loaded.into_value()[0].name, "Read");
    }

    #[test]
    fn test_malformed_payload_is_repaired_not_failed() {
        let repo = Repository::open_in_memory().unwrap();
        repo.db()
            .write_collection(
                Collection::Habits.key(),
                r#"[{"id": "nope", "name": "Read", "status": "zombie"}]"#,
            )
            .unwrap();

        let loaded = repo.load::<Habits>().unwrap();
        assert!(loaded.is_repaired());
        let habits = loaded.into_value();
        assert_eq!(habits.len(), 1);
        assert_eq!(habits[0].name, "Read");
    }

    #[test]
    fn test_non_json_payload_resets() {
        let repo = Repository::open_in_memory().unwrap();
        repo.db()
            .write_collection(Collection::Habits.key(), "definitely not json")
            .unwrap();

        let habits: Habits = repo.get().unwrap();
        assert!(habits.is_empty());
    }

    #[test]
    fn test_write_emits_change_event() {
        let repo = Repository::open_in_memory().unwrap();
        let mut events = repo.subscribe();

        repo.set(&Habits::new()).unwrap();

        let event = events.try_recv().unwrap();
        assert_eq!(event.collection, Collection::Habits);
    }

    #[test]
    fn test_passthrough_round_trip() {
        let repo = Repository::open_in_memory().unwrap();
        let value = serde_json::json!({ "theme": "dark" });
        repo.set_passthrough(Collection::Settings, &value).unwrap();
        assert_eq!(repo.get_passthrough(Collection::Settings).unwrap(), value);
    }
}
