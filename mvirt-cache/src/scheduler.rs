//! Periodic full scans.
//!
//! Every agent runs on its own timer. A failed scan is logged and retried on
//! the next tick; the cache keeps its previous content meanwhile.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::agent::Agent;

pub struct AgentScheduler {
    interval: Duration,
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl AgentScheduler {
    pub fn new(interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            interval,
            handles: Vec::new(),
            shutdown_tx,
        }
    }

    /// Start the scan loop of one agent. The first scan runs immediately.
    pub fn spawn(&mut self, agent: Arc<dyn Agent>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.interval;

        self.handles.push(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(agent = %agent.agent_type(), interval = ?period, "Starting caching agent");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match agent.run_once().await {
                            Ok(summary) => debug!(agent = %agent.agent_type(), ?summary, "Scan finished"),
                            Err(e) => warn!(agent = %agent.agent_type(), error = %e, "Scan failed"),
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!(agent = %agent.agent_type(), "Caching agent stopped");
        }));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop all loops. Scans in flight finish first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
