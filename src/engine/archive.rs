//! Daily archival of the today bucket into historical storage.
//!
//! The migration itself is a plain function so it can run out-of-band
//! (on app start, to catch up a missed midnight) as well as from the
//! self-rescheduling timer. It is idempotent: an activity id already in
//! history is never copied twice.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeZone};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::clock::Clock;
use crate::engine::EngineError;
use crate::storage::{ActivityHistory, Calendar, Repository, TodayBucket};

/// What one archival run moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    /// Bucket days migrated and cleared
    pub days_archived: usize,
    /// Activities appended to history
    pub activities_moved: usize,
    /// Activities skipped because history already held their id
    pub duplicates_skipped: usize,
}

/// Migrate every today-bucket day that has aged out.
///
/// Days strictly before the device-local today are copied into the
/// historical collection and the calendar aggregate, then cleared from
/// the bucket. Safe to call at any time; a second call on the same day
/// changes nothing.
pub fn archive_due(repo: &Repository, clock: &dyn Clock) -> Result<ArchiveReport, EngineError> {
    let today = clock.today();
    let mut bucket: TodayBucket = repo.get()?;

    let due: Vec<_> = bucket.keys().filter(|&&day| day < today).copied().collect();
    if due.is_empty() {
        return Ok(ArchiveReport::default());
    }

    let mut history: ActivityHistory = repo.get()?;
    let mut calendar: Calendar = repo.get()?;
    let mut known: HashSet<_> = history.iter().map(|a| a.id).collect();
    let mut report = ArchiveReport::default();

    for day in due {
        let Some(activities) = bucket.remove(&day) else {
            continue;
        };

        let calendar_day = calendar.entry(day).or_default();
        for activity in activities {
            if !known.insert(activity.id) {
                report.duplicates_skipped += 1;
                continue;
            }
            if !calendar_day.activities.iter().any(|a| a.id == activity.id) {
                calendar_day.activities.push(activity.clone());
            }
            history.push(activity);
            report.activities_moved += 1;
        }
        if calendar_day.is_empty() {
            calendar.remove(&day);
        }
        report.days_archived += 1;
    }

    repo.set(&history)?;
    repo.set(&calendar)?;
    repo.set(&bucket)?;

    tracing::info!(
        days = report.days_archived,
        moved = report.activities_moved,
        skipped = report.duplicates_skipped,
        "Archived aged-out activity buckets"
    );
    Ok(report)
}

/// Time until the next local midnight.
pub fn next_midnight_delay<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let Some(tomorrow) = now.date_naive().succ_opt() else {
        // Calendar overflow; retry in a day
        return Duration::from_secs(24 * 60 * 60);
    };
    let midnight = tomorrow.and_time(NaiveTime::MIN);

    match now.timezone().from_local_datetime(&midnight).earliest() {
        Some(next) => (next - now.clone())
            .to_std()
            .unwrap_or(Duration::from_secs(1)),
        // Midnight skipped by a DST transition; check again in an hour
        None => Duration::from_secs(60 * 60),
    }
}

/// Self-rescheduling midnight archival task.
///
/// Sleeps to the next local midnight, runs the migration, reschedules.
/// Failures are logged and the timer keeps going; correctness never
/// depends on it having run continuously because [`archive_due`] catches
/// up on startup.
pub struct MidnightScheduler {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl MidnightScheduler {
    /// Spawn the archival timer on the current runtime.
    pub fn spawn(repo: Repository, clock: Arc<dyn Clock>) -> Self {
        let (shutdown, mut signal) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                let delay = next_midnight_delay(&clock.now_local());
                tracing::debug!(?delay, "Next archival scheduled");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        if let Err(e) = archive_due(&repo, clock.as_ref()) {
                            tracing::warn!("Midnight archival failed: {e}");
                        }
                    }
                    _ = signal.changed() => {
                        if *signal.borrow() {
                            tracing::debug!("Archival timer stopped");
                            break;
                        }
                    }
                }
            }
        });

        Self { handle, shutdown }
    }

    /// Stop the timer. Idempotent; the task exits at the next poll.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Stop the timer and wait for the task to exit.
    pub async fn join(self) {
        self.shutdown();
        let _ = self.handle.await;
    }
}
