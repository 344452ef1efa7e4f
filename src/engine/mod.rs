//! Completion engine, reconciliation sweep, and archival process.

pub mod archive;
pub mod clock;
pub mod completion;
pub mod reconcile;
pub mod streaks;

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::storage::StoreError;

pub use archive::{archive_due, next_midnight_delay, ArchiveReport, MidnightScheduler};
pub use clock::{Clock, FixedClock, SystemClock};
pub use completion::CompletionEngine;
pub use reconcile::{cascade_delete, run_sweep, SweepReport};

/// Engine operation errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The day lies strictly after the device-local today
    #[error("Cannot complete a future day: {day}")]
    InvalidDate { day: NaiveDate },

    #[error("Habit not found: {0}")]
    HabitNotFound(Uuid),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}
