//! Push/pull synchronization against the remote mirror.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use super::remote::RemoteMirror;
use super::{SkipReason, SyncError, SyncPayload};
use crate::engine::clock::Clock;
use crate::engine::streaks;
use crate::model::{CompletionStatus, SyncCursor};
use crate::storage::{
    ActivityHistory, Collection, CompletionMap, Habits, Repository, StreakMap, TodayBucket,
};

/// Result of one sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Push and pull both succeeded; the cursor was advanced
    Completed { pushed: usize, pulled: usize },
    /// Nothing ran
    Skipped(SkipReason),
}

/// Synchronizes the local store with the remote mirror.
///
/// Single-flighted: a trigger arriving while a sync is in flight is
/// ignored, not queued. The in-flight latch is the only mutual-exclusion
/// mechanism in the subsystem because the push/pull await is the only
/// suspension point during which another trigger can legally fire.
///
/// Conflict policy is deliberately coarse: the full local state is pushed,
/// then the full remote state is pulled and overwrites per collection.
/// Last write observed wins; two devices editing the same habit between
/// syncs will silently keep only one edit.
pub struct SyncAdapter<R: RemoteMirror> {
    repo: Repository,
    remote: Arc<R>,
    clock: Arc<dyn Clock>,
    user_id: Option<Uuid>,
    in_flight: Arc<AtomicBool>,
}

impl<R: RemoteMirror> SyncAdapter<R> {
    /// Create an adapter. `user_id` of `None` means an unauthenticated
    /// session: every sync attempt is skipped without touching the network.
    pub fn new(
        repo: Repository,
        remote: Arc<R>,
        clock: Arc<dyn Clock>,
        user_id: Option<Uuid>,
    ) -> Self {
        Self {
            repo,
            remote,
            clock,
            user_id,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a sync is currently running.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one push/pull pair.
    ///
    /// On any failure the local state and the sync cursor are left
    /// untouched; the next natural trigger retries.
    pub async fn sync(&self) -> Result<SyncOutcome, SyncError> {
        let Some(user_id) = self.user_id else {
            tracing::debug!("Sync skipped: not authenticated");
            return Ok(SyncOutcome::Skipped(SkipReason::NotAuthenticated));
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sync skipped: already in flight");
            return Ok(SyncOutcome::Skipped(SkipReason::AlreadyRunning));
        }
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));

        let local = self.snapshot()?;
        let pushed = local.record_count();

        self.remote.push(user_id, &local).await?;
        let remote_state = self.remote.fetch(user_id).await?;
        let pulled = remote_state.record_count();

        self.apply(remote_state)?;

        let mut cursor: SyncCursor = self.repo.get()?;
        cursor.last_synced_at = Some(self.clock.now());
        cursor.migration_done = true;
        self.repo.set(&cursor)?;

        tracing::info!(user = %user_id, pushed, pulled, "Sync completed");
        Ok(SyncOutcome::Completed { pushed, pulled })
    }

    /// Read the full local state into a payload.
    ///
    /// The remote has a single activities collection, so the today bucket
    /// is flattened into the historical list for the wire.
    fn snapshot(&self) -> Result<SyncPayload, SyncError> {
        let habits: Habits = self.repo.get()?;
        let completions: CompletionMap = self.repo.get()?;
        let mut activities: ActivityHistory = self.repo.get()?;

        let bucket: TodayBucket = self.repo.get()?;
        for day_activities in bucket.into_values() {
            activities.extend(day_activities);
        }

        Ok(SyncPayload {
            habits,
            completions,
            activities,
            cycle_data: self.repo.get_passthrough(Collection::CycleData)?,
            reflections: self.repo.get_passthrough(Collection::Reflections)?,
            settings: self.repo.get_passthrough(Collection::Settings)?,
        })
    }

    /// Overwrite local collections with the pulled state.
    ///
    /// Pulled activities are split back into the two local buckets: days
    /// before today land in history, today and later in the today bucket.
    /// Streak records are recomputed afterwards so the cache never
    /// outlives the completions it was derived from.
    fn apply(&self, payload: SyncPayload) -> Result<(), SyncError> {
        let today = self.clock.today();

        let mut history = ActivityHistory::new();
        let mut bucket = TodayBucket::new();
        for activity in payload.activities {
            if activity.day < today {
                history.push(activity);
            } else {
                bucket.entry(activity.day).or_default().push(activity);
            }
        }

        let mut streaks: StreakMap = self.repo.get()?;
        let mut rebuilt = StreakMap::new();
        for habit in &payload.habits {
            let days = payload
                .completions
                .get(&habit.id)
                .map(|entry| {
                    entry
                        .iter()
                        .filter(|c| c.status == CompletionStatus::Completed)
                        .map(|c| c.day)
                        .collect()
                })
                .unwrap_or_default();
            let prior_longest = streaks.remove(&habit.id).map(|r| r.longest).unwrap_or(0);
            rebuilt.insert(habit.id, streaks::compute_record(&days, today, prior_longest));
        }

        self.repo.set(&payload.habits)?;
        self.repo.set(&payload.completions)?;
        self.repo.set(&history)?;
        self.repo.set(&bucket)?;
        self.repo.set(&rebuilt)?;
        self.repo
            .set_passthrough(Collection::CycleData, &payload.cycle_data)?;
        self.repo
            .set_passthrough(Collection::Reflections, &payload.reflections)?;
        self.repo
            .set_passthrough(Collection::Settings, &payload.settings)?;

        Ok(())
    }
}

/// Releases the in-flight latch when the sync attempt ends, on success
/// and on error alike.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
