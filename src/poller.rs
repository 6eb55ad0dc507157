use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::errors::best_effort;
use crate::fleet::Fleet;
use crate::types::FleetSnapshot;

/// Default polling interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

/// Fixed-interval driver for discovery and reconciliation.
///
/// Each tick enumerates devices, reconciles the fleet, runs best-effort
/// enrichment and process scans, polls the selected browser's pages, and
/// publishes a snapshot on a watch channel. A failed tick is captured into
/// the snapshot's error field and never stops the next tick.
pub struct Poller {
    fleet: Arc<Mutex<Fleet>>,
    interval: Duration,
    tx: watch::Sender<FleetSnapshot>,
    shutdown: Arc<Notify>,
}

/// Cheap handle for subscribers and for requesting shutdown
#[derive(Clone)]
pub struct PollerHandle {
    rx: watch::Receiver<FleetSnapshot>,
    shutdown: Arc<Notify>,
}

impl PollerHandle {
    /// Receiver yielding one snapshot per tick
    pub fn snapshots(&self) -> watch::Receiver<FleetSnapshot> {
        self.rx.clone()
    }

    /// Ask the poll loop to stop after the current tick
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

impl Poller {
    pub fn new(fleet: Arc<Mutex<Fleet>>, tick_interval: Duration) -> Self {
        let (tx, _) = watch::channel(FleetSnapshot::default());
        Self {
            fleet,
            interval: tick_interval,
            tx,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn handle(&self) -> PollerHandle {
        PollerHandle {
            rx: self.tx.subscribe(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// One polling pass. Public so callers can run a single on-demand
    /// refresh outside the loop.
    pub async fn tick(&self) {
        // Holding the fleet lock for the whole tick keeps reconciliation
        // single-writer.
        let mut fleet = self.fleet.lock().await;

        let mut error = None;
        match fleet.refresh_devices().await {
            Ok(()) => {
                for i in 0..fleet.devices.len() {
                    best_effort("device enrichment", fleet.enrich_device(i)).await;
                    best_effort("running-process scan", fleet.scan_browsers(i)).await;
                }
                fleet.refresh_selected_pages().await;
            }
            Err(e) => {
                error = Some(e.to_string());
            }
        }

        let mut snapshot = fleet.snapshot();
        snapshot.error = error;
        let _ = self.tx.send(snapshot);
    }

    /// Run until shutdown is requested
    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = self.shutdown.notified() => {
                    debug!("Polling driver stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "poller_test.rs"]
mod poller_test;
