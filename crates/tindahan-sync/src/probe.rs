//! # Connectivity Probe
//!
//! Feeds the [`NetworkMonitor`] from a periodic reachability check of the
//! REST API, for hosts without a native connectivity signal.
//!
//! ```text
//!   every probe_interval:
//!     GET {base_url}{probe_path}
//!       ├── any answer below 500 ──► monitor.set_online(true)
//!       └── 5xx / error / timeout ─► monitor.set_online(false)
//! ```
//!
//! The monitor only fires callbacks on a change, so repeated identical
//! results are free.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::network::NetworkMonitor;
use crate::remote::ApiClient;

pub struct ConnectivityProbe {
    client: ApiClient,
    path: String,
    interval: Duration,
    monitor: Arc<NetworkMonitor>,
}

/// Handle to a running probe task.
pub struct ProbeHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ProbeHandle {
    /// Stops the probe and waits for its task to exit.
    pub async fn shutdown(self) -> SyncResult<()> {
        // The task may already have exited; that is fine.
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| SyncError::Internal(format!("probe task failed: {e}")))
    }
}

impl ConnectivityProbe {
    pub fn new(
        client: ApiClient,
        path: impl Into<String>,
        interval: Duration,
        monitor: Arc<NetworkMonitor>,
    ) -> Self {
        ConnectivityProbe {
            client,
            path: path.into(),
            interval,
            monitor,
        }
    }

    pub fn from_config(config: &SyncConfig, monitor: Arc<NetworkMonitor>) -> SyncResult<Self> {
        Ok(Self::new(
            ApiClient::from_config(config)?,
            config.sync.probe_path.clone(),
            config.probe_interval(),
            monitor,
        ))
    }

    /// Performs one reachability check without touching the monitor.
    pub async fn check(&self) -> bool {
        match self.client.get_status(&self.path).await {
            Ok(status) => !status.is_server_error(),
            Err(e) => {
                debug!(error = %e, "Connectivity probe failed");
                false
            }
        }
    }

    /// Checks once and feeds the result to the monitor.
    pub async fn probe_once(&self) -> bool {
        let online = self.check().await;
        self.monitor.set_online(online);
        online
    }

    /// Spawns the probe loop. The first check runs immediately.
    pub fn spawn(self) -> ProbeHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run(shutdown_rx));
        ProbeHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(
            path = %self.path,
            interval_secs = self.interval.as_secs(),
            "Connectivity probe started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.probe_once().await;
                }

                _ = shutdown_rx.recv() => {
                    info!("Connectivity probe received shutdown");
                    break;
                }
            }
        }
    }
}
