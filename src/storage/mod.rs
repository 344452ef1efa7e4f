//! Storage module for the local store and configuration.

pub mod config;
pub mod database;
pub mod repair;
pub mod repository;
pub mod schema;

pub use config::{AppConfig, ConfigError, SyncSettings};
pub use database::{Database, DatabaseError};
pub use repair::{RepairKind, RepairWarning};
pub use repository::{
    ActivityHistory, Calendar, Collection, CollectionValue, CompletionMap, Habits, Loaded,
    Repository, StoreError, StreakMap, TodayBucket,
};
