//! RustHabit - Habit & Activity Tracker Core
//!
//! The local-first data layer of a personal habit tracker: defensive
//! collection storage over SQLite, completion and streak derivation, a
//! cross-collection reconciliation sweep, daily archival of activity
//! buckets, and push/pull synchronization with a remote mirror.

pub mod engine;
pub mod events;
pub mod model;
pub mod storage;
pub mod sync;

// Re-export commonly used types
pub use engine::{CompletionEngine, EngineError, SystemClock};
pub use model::{Activity, Completion, Habit, StreakRecord};
pub use storage::{AppConfig, Database, Repository};
pub use sync::{SyncAdapter, SyncError};
