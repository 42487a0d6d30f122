//! Periodic background work: snapshot persistence and stale-source eviction.
//!
//! Each job is an independent tokio task driven by an interval timer and
//! stopped through the shared shutdown signal. [`stop_with_grace`] gives a
//! task a bounded window to finish its current cycle before aborting it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use weather_core::{ContentStore, EvictionReport};
use weather_core::persist::{SnapshotPaths, write_snapshot};

/// Write one snapshot of `store`. Failures are logged and reported as `false`.
pub async fn persist_once(store: &ContentStore, paths: &SnapshotPaths) -> bool {
    let snapshot = store.snapshot();
    match write_snapshot(&snapshot, paths).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "snapshot write failed, retrying next cycle");
            false
        }
    }
}

/// Run one eviction pass against the current wall clock.
///
/// The store logs what it removed.
pub fn evict_once(store: &ContentStore, staleness: TimeDelta) -> EvictionReport {
    store.evict(staleness, Utc::now())
}

/// Spawn the persistence task.
pub(crate) fn spawn_persistence(
    store: Arc<ContentStore>,
    paths: SnapshotPaths,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    persist_once(&store, &paths).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("persistence task stopped");
    })
}

/// Spawn the eviction task.
pub(crate) fn spawn_eviction(
    store: Arc<ContentStore>,
    every: Duration,
    staleness: TimeDelta,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    evict_once(&store, staleness);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("eviction task stopped");
    })
}

/// Wait up to `grace` for `handle` to finish, then abort it.
pub(crate) async fn stop_with_grace(name: &'static str, handle: JoinHandle<()>, grace: Duration) {
    let abort = handle.abort_handle();
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(())) => debug!(task = name, "task stopped"),
        Ok(Err(e)) => warn!(task = name, error = %e, "task ended abnormally"),
        Err(_) => {
            abort.abort();
            warn!(
                task = name,
                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                "task did not stop within grace period, aborted"
            );
        }
    }
}
