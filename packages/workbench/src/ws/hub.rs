//! Fan-out of workspace changes to every connection.
//!
//! The watcher feeds a single channel; [`ChangeHub::spawn_pump`] drains it
//! into a broadcast that each connection subscribes to. A connection that
//! falls more than `capacity` events behind loses the oldest ones and is told
//! to refresh without a path.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use workspace_fs::FileChangeEvent;

use crate::metrics::ServerMetrics;

pub struct ChangeHub {
    tx: broadcast::Sender<FileChangeEvent>,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FileChangeEvent> {
        self.tx.subscribe()
    }

    /// Deliver `event` to every current subscriber. Returns how many there
    /// were; zero is not an error.
    pub fn publish(&self, event: FileChangeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    #[allow(dead_code)]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Forward watcher events into the hub until the watcher goes away.
    pub fn spawn_pump(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<FileChangeEvent>,
        metrics: Arc<ServerMetrics>,
    ) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let receivers = hub.publish(event);
                if receivers > 0 {
                    metrics.broadcast_sent();
                }
                debug!(receivers, "Published workspace change");
            }
            info!("Workspace change stream closed");
        })
    }
}
