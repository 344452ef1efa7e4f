//! Remote mirror synchronization.
//!
//! Sync is only active for authenticated (premium) sessions; without an
//! account the whole subsystem stays local and never touches the network.

pub mod adapter;
pub mod remote;
pub mod scheduler;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Activity, Completion, Habit};
use crate::storage::StoreError;

pub use adapter::{SyncAdapter, SyncOutcome};
pub use remote::{HttpRemote, RemoteMirror};
pub use scheduler::SyncScheduler;

/// Sync-related errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote service error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Network(e.to_string())
    }
}

/// Why a sync attempt did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No authenticated account; local-only session
    NotAuthenticated,
    /// Another sync is already in flight
    AlreadyRunning,
}

/// The full state exchanged with the remote mirror.
///
/// The wire shape matches the service's collections; `cycle_data`,
/// `reflections`, and `settings` ride along opaquely. Both push and fetch
/// are idempotent upserts keyed by record id on the service side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncPayload {
    pub habits: Vec<Habit>,
    pub completions: BTreeMap<Uuid, Vec<Completion>>,
    pub activities: Vec<Activity>,
    pub cycle_data: Value,
    pub reflections: Value,
    pub settings: Value,
}

impl SyncPayload {
    /// Total number of records carried, for logging.
    pub fn record_count(&self) -> usize {
        self.habits.len()
            + self.completions.values().map(Vec::len).sum::<usize>()
            + self.activities.len()
    }
}
