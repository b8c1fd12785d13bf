//! Background sampler: on every tick read the sensors, build a snapshot,
//! cache it, publish it to live subscribers, and run the alert checks. Ticks
//! never overlap; the next sleep only starts after the previous tick is done.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::alerts::{AlertEngine, FiredAlert};
use crate::snapshot::{build_snapshot, unix_millis};
use crate::state::AppState;
use crate::types::Snapshot;

/// Take one CPU sample so the first served snapshot already has a baseline.
pub async fn prime(state: &AppState) {
    state.sensors.lock().await.prime();
}

/// Read the sensors once and build a snapshot against the current config.
pub async fn collect_snapshot(state: &AppState) -> Arc<Snapshot> {
    let config = state.config.read().await.clone();
    let readings = state.sensors.lock().await.read().await;
    Arc::new(build_snapshot(&readings, &config, unix_millis()))
}

/// Cached snapshot, or (cold start, before the first tick) a fresh one.
pub async fn current_snapshot(state: &AppState) -> Arc<Snapshot> {
    if let Some(s) = state.latest.read().await.clone() {
        return s;
    }
    let snapshot = collect_snapshot(state).await;
    let mut latest = state.latest.write().await;
    // a tick may have landed while we were reading sensors
    latest.get_or_insert_with(|| snapshot.clone()).clone()
}

/// One full sampling cycle.
pub async fn tick(state: &AppState, alerts: &mut AlertEngine, now: Instant) -> Vec<FiredAlert> {
    let config = state.config.read().await.clone();
    let readings = state.sensors.lock().await.read().await;
    let snapshot = Arc::new(build_snapshot(&readings, &config, unix_millis()));
    *state.latest.write().await = Some(snapshot.clone());

    let delivered = state.broadcaster.publish(&snapshot);
    debug!(delivered, cpu = ?snapshot.cpu_percent, "tick published");

    let fired = alerts.evaluate(&snapshot, &config, now);
    for a in &fired {
        info!(kind = a.kind.as_str(), value = a.value, threshold = a.threshold, "alert fired");
    }
    fired
}

/// Sleep for the configured interval, then tick; forever. The interval is
/// re-read from the shared config before every sleep.
pub fn spawn_sampler(state: AppState, mut alerts: AlertEngine) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let period = state.config.read().await.poll_interval();
            sleep(period).await;
            tick(&state, &mut alerts, Instant::now()).await;
        }
    })
}
