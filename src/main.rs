//! RustHabit - Habit & Activity Tracker Core
//!
//! Headless entry point: opens the local store, repairs and catches up
//! state, then keeps the archival and sync schedulers running until
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rusthabit::engine::{archive_due, run_sweep, MidnightScheduler, SystemClock};
use rusthabit::events::SyncTrigger;
use rusthabit::storage::{AppConfig, Database, Repository};
use rusthabit::sync::{HttpRemote, SyncAdapter, SyncScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting RustHabit v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load();
    let db_path = config.database_path();
    tracing::info!("Opening store at {}", db_path.display());

    let repo = Repository::new(Database::open(&db_path)?);
    let clock = Arc::new(SystemClock);

    // Converge stored state before anything else runs: repair drifted
    // collections, then catch up any midnight the process slept through.
    let sweep = run_sweep(&repo, clock.as_ref())?;
    if !sweep.is_clean() {
        tracing::info!(?sweep, "Startup sweep repaired state");
    }
    archive_due(&repo, clock.as_ref())?;

    let archival = MidnightScheduler::spawn(repo.clone(), clock.clone());

    let sync = if config.sync_authenticated() {
        let token = config.sync.token.clone().unwrap_or_default();
        let remote = Arc::new(HttpRemote::new(config.sync.endpoint.clone(), token));
        let adapter = Arc::new(SyncAdapter::new(
            repo.clone(),
            remote,
            clock.clone(),
            config.sync.user_id,
        ));

        // Startup sync, then trigger-driven from here on
        if let Err(e) = adapter.sync().await {
            tracing::warn!("Startup sync failed: {e}");
        }

        let (trigger_tx, trigger_rx) = mpsc::channel::<SyncTrigger>(16);
        let scheduler = SyncScheduler::spawn(
            adapter,
            trigger_rx,
            Duration::from_secs(config.sync.interval_secs.max(1)),
        );
        Some((scheduler, trigger_tx))
    } else {
        tracing::info!("No authenticated account, staying local");
        None
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    archival.join().await;
    if let Some((scheduler, _triggers)) = sync {
        scheduler.join().await;
    }

    Ok(())
}
