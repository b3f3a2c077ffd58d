//! Periodic background refresh of stale entries.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinSet;

use vtrack_core::artifact::ArtifactKey;
use vtrack_store::VersionStore;

use crate::tracker::{StalePolicy, VersionTracker};

/// Sweeps the store on an interval and refreshes entries whose freshness
/// window elapsed. Probes go through the tracker's keyed locks and worker
/// pool, so foreground queries and the sweep never double-fetch a key.
/// Ticks never overlap: a tick ends when its tasks finish or the next tick
/// is due, whichever comes first.
pub struct BackgroundUpdater {
    shutdown: Arc<Notify>,
    handle: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BackgroundUpdater {
    /// Spawn the sweep loop. The first sweep runs immediately.
    pub fn start(
        tracker: Arc<VersionTracker>,
        storage: Arc<dyn VersionStore>,
        policy: StalePolicy,
        interval: Duration,
    ) -> Self {
        let shutdown = Arc::new(Notify::new());
        let notify = shutdown.clone();
        let handle = tokio::spawn(async move {
            run_loop(tracker, storage, policy, interval, notify).await;
        });
        Self {
            shutdown,
            handle: parking_lot::Mutex::new(Some(handle)),
        }
    }

    /// Stop the loop and wait for the current tick to wind down.
    pub async fn shutdown(&self) {
        self.shutdown.notify_one();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn run_loop(
    tracker: Arc<VersionTracker>,
    storage: Arc<dyn VersionStore>,
    policy: StalePolicy,
    interval: Duration,
    shutdown: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.notified() => return,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = shutdown.notified() => return,
            _ = run_tick(&tracker, &storage, policy, interval) => {}
        }
    }
}

/// One sweep: snapshot the store, refresh everything stale, bounded by the
/// tick interval so the next tick is never delayed by a slow upstream.
async fn run_tick(
    tracker: &Arc<VersionTracker>,
    storage: &Arc<dyn VersionStore>,
    policy: StalePolicy,
    budget: Duration,
) {
    let entries = match storage.get_all_versions() {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Background sweep could not snapshot the store: {e:?}");
            return;
        }
    };

    let now = Utc::now();
    let stale: Vec<ArtifactKey> = entries
        .iter()
        .filter(|info| policy.is_stale(info, now))
        .map(|info| info.key())
        .collect();
    if stale.is_empty() {
        return;
    }
    tracing::debug!(
        "Background sweep: {} of {} entries stale",
        stale.len(),
        entries.len()
    );

    let mut tasks = JoinSet::new();
    for key in stale {
        let tracker = tracker.clone();
        tasks.spawn(async move { tracker.refresh_stale(&key, policy).await });
    }

    let deadline = tokio::time::sleep(budget);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::debug!("Next sweep due, abandoning {} refreshes", tasks.len());
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                return;
            }
            joined = tasks.join_next() => {
                if joined.is_none() {
                    return;
                }
            }
        }
    }
}
