//! Signals exchanged with the layers above the core.
//!
//! The repository broadcasts [`DataChanged`] after every successful write;
//! outer layers re-render off it. [`SyncTrigger`] values flow the other way,
//! into the sync scheduler.

use crate::storage::Collection;

/// Emitted after any repository write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataChanged {
    /// Which collection was written
    pub collection: Collection,
}

/// An event that should cause a synchronization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTrigger {
    /// The window regained focus
    Focus,
    /// The network came back online
    Online,
    /// The periodic interval elapsed
    Interval,
    /// The remote service announced a change to a table
    Realtime { table: String },
}

impl std::fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncTrigger::Focus => write!(f, "focus"),
            SyncTrigger::Online => write!(f, "online"),
            SyncTrigger::Interval => write!(f, "interval"),
            SyncTrigger::Realtime { table } => write!(f, "realtime:{table}"),
        }
    }
}
