//! Trigger-driven sync scheduling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::adapter::SyncAdapter;
use super::remote::RemoteMirror;
use crate::events::SyncTrigger;

/// Runs a sync attempt for every trigger: focus, online, realtime
/// notifications arriving on the channel, plus a periodic interval.
///
/// The adapter's single-flight latch makes overlapping triggers a no-op,
/// so the scheduler fires eagerly and never queues.
pub struct SyncScheduler {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl SyncScheduler {
    /// Spawn the scheduler on the current runtime.
    pub fn spawn<R>(
        adapter: Arc<SyncAdapter<R>>,
        mut triggers: mpsc::Receiver<SyncTrigger>,
        every: Duration,
    ) -> Self
    where
        R: RemoteMirror + 'static,
    {
        let (shutdown, mut signal) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval fires immediately; the startup
            // sync is the caller's decision, not the scheduler's.
            ticker.tick().await;

            let mut triggers_open = true;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_once(&adapter, SyncTrigger::Interval).await;
                    }
                    trigger = triggers.recv(), if triggers_open => {
                        match trigger {
                            Some(trigger) => run_once(&adapter, trigger).await,
                            // All trigger senders dropped; the interval keeps going
                            None => triggers_open = false,
                        }
                    }
                    _ = signal.changed() => {
                        if *signal.borrow() {
                            tracing::debug!("Sync scheduler stopped");
                            break;
                        }
                    }
                }
            }
        });

        Self { handle, shutdown }
    }

    /// Stop the scheduler. Idempotent; the task exits at the next poll.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Stop the scheduler and wait for the task to exit.
    pub async fn join(self) {
        self.shutdown();
        let _ = self.handle.await;
    }
}

async fn run_once<R: RemoteMirror>(adapter: &SyncAdapter<R>, trigger: SyncTrigger) {
    match adapter.sync().await {
        Ok(outcome) => tracing::debug!(%trigger, ?outcome, "Sync attempt finished"),
        Err(e) => tracing::warn!(%trigger, "Sync attempt failed: {e}"),
    }
}
