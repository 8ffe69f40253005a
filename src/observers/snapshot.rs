//! Periodic traffic snapshot push.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::observers::hub::BroadcastHub;
use crate::observers::traffic::TrafficSource;

/// Broadcasts recent captured requests whenever newer traffic appears.
pub struct SnapshotPoller {
    hub: Arc<BroadcastHub>,
    source: Arc<dyn TrafficSource>,
    interval: Duration,
    limit: usize,
    last_seen: Option<i64>,
}

impl SnapshotPoller {
    pub fn new(
        hub: Arc<BroadcastHub>,
        source: Arc<dyn TrafficSource>,
        interval: Duration,
        limit: usize,
    ) -> Self {
        Self {
            hub,
            source,
            interval,
            limit,
            last_seen: None,
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Snapshot poller starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Snapshot poller received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Broadcast if the newest timestamp advanced. Returns whether it did.
    pub async fn poll_once(&mut self) -> bool {
        let Some(latest) = self.source.latest_timestamp().await else {
            return false;
        };
        if self.last_seen.is_some_and(|seen| latest <= seen) {
            return false;
        }
        self.last_seen = Some(latest);

        let requests = self.source.recent(self.limit).await;
        let delivered = self.hub.broadcast_snapshot(&requests);
        tracing::debug!(latest, count = requests.len(), delivered, "Traffic snapshot broadcast");
        true
    }
}
