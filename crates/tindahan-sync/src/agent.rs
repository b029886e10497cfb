//! # Sync Agent
//!
//! Owns the lifecycle of automatic syncing: turns reconnects and timer
//! ticks into drain requests and runs them through the [`SyncManager`].
//!
//! ## Trigger Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  PRODUCERS                          CHANNEL            CONSUMER         │
//! │  ─────────                          ───────            ────────         │
//! │                                                                         │
//! │  NetworkMonitor callback ──┐                                            │
//! │  (offline → online)        │     ┌──────────────┐    ┌──────────────┐  │
//! │                            ├───► │ mpsc (cap 1) │ ─► │ drain task   │  │
//! │  Timer (poll_interval,     │     │ try_send:    │    │ manager.     │  │
//! │  only while online)  ──────┤     │ full = drop  │    │ drain()      │  │
//! │                            │     └──────────────┘    └──────┬───────┘  │
//! │  Startup (when online) ────┘                                │          │
//! │                                                             ▼          │
//! │  SyncAgentHandle::sync_now ─────────────────────────► SyncStatus       │
//! │                                                       + emitter        │
//! │                                                                         │
//! │  Producers drop their request while a drain is running; the next       │
//! │  reconnect or tick picks up whatever is left.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Mode       | Reconnect | Timer | Startup | sync_now |
//! |------------|-----------|-------|---------|----------|
//! | `auto`     | yes       | yes   | yes     | yes      |
//! | `manual`   | no        | no    | no      | yes      |
//! | `disabled` | no        | no    | no      | no       |

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{SyncConfig, SyncMode};
use crate::error::{SyncError, SyncResult};
use crate::manager::{DrainOutcome, SyncManager};
use crate::network::{CallbackId, NetworkMonitor};

// =============================================================================
// Sync Status
// =============================================================================

/// Current sync status for external queries.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub mode: SyncMode,

    pub is_online: bool,

    /// Whether a drain cycle is running right now.
    pub is_draining: bool,

    /// Unsynced queued mutations after the last drain.
    pub pending_count: i64,

    /// When the last completed drain finished.
    pub last_sync: Option<DateTime<Utc>>,

    pub last_synced_count: usize,

    pub last_failed_count: usize,

    /// Error from the last drain, if any item failed.
    pub last_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus {
            mode: SyncMode::Auto,
            is_online: false,
            is_draining: false,
            pending_count: 0,
            last_sync: None,
            last_synced_count: 0,
            last_failed_count: 0,
            last_error: None,
        }
    }
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives agent status changes (implemented by the UI host).
pub trait SyncEventEmitter: Send + Sync {
    fn emit_status(&self, status: &SyncStatus);

    fn emit_progress(&self, pending: i64, synced: usize);

    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_progress(&self, _pending: i64, _synced: usize) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Drain Requests
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainTrigger {
    Startup,
    Reconnect,
    Timer,
}

/// State shared by the agent tasks and the handle.
struct AgentShared {
    manager: Arc<SyncManager>,
    network: Arc<NetworkMonitor>,
    status: RwLock<SyncStatus>,
    emitter: Arc<dyn SyncEventEmitter>,
}

impl AgentShared {
    /// Producer side: drops the request when a drain is running or one is
    /// already waiting.
    fn request(&self, tx: &mpsc::Sender<DrainTrigger>, trigger: DrainTrigger) {
        if self.manager.is_draining() {
            debug!(?trigger, "Drain running, dropping trigger");
            return;
        }
        if tx.try_send(trigger).is_err() {
            debug!(?trigger, "Drain already requested, dropping trigger");
        }
    }

    async fn run_drain(&self) -> DrainOutcome {
        {
            let mut s = self.status.write().await;
            s.is_draining = true;
            s.is_online = self.network.is_online();
        }

        let outcome = self.manager.drain().await;

        let pending = self.manager.pending_total().await;
        let snapshot = {
            let mut s = self.status.write().await;
            s.is_draining = self.manager.is_draining();
            s.is_online = self.network.is_online();
            match pending {
                Ok(count) => s.pending_count = count,
                Err(ref e) => warn!(error = %e, "Failed to count pending mutations"),
            }
            if let DrainOutcome::Completed(report) = &outcome {
                s.last_sync = Some(report.finished_at);
                s.last_synced_count = report.synced();
                s.last_failed_count = report.failed();
                s.last_error = report.first_error().map(str::to_owned);
            }
            s.clone()
        };

        if let DrainOutcome::Completed(report) = &outcome {
            if !report.is_empty() {
                self.emitter.emit_progress(snapshot.pending_count, report.synced());
            }
            if let Some(message) = report.first_error() {
                self.emitter.emit_error(message, true);
            }
        }
        self.emitter.emit_status(&snapshot);

        outcome
    }

    async fn snapshot(&self) -> SyncStatus {
        let mut status = self.status.read().await.clone();
        status.is_online = self.network.is_online();
        status.is_draining = self.manager.is_draining();
        status
    }
}

// =============================================================================
// Sync Agent
// =============================================================================

pub struct SyncAgent {
    mode: SyncMode,
    poll_interval: Duration,
    shared: Arc<AgentShared>,
}

impl SyncAgent {
    pub fn new(
        mode: SyncMode,
        poll_interval: Duration,
        manager: Arc<SyncManager>,
        network: Arc<NetworkMonitor>,
    ) -> Self {
        Self::with_emitter(mode, poll_interval, manager, network, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(
        mode: SyncMode,
        poll_interval: Duration,
        manager: Arc<SyncManager>,
        network: Arc<NetworkMonitor>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let status = SyncStatus {
            mode,
            is_online: network.is_online(),
            ..Default::default()
        };

        SyncAgent {
            mode,
            poll_interval,
            shared: Arc::new(AgentShared {
                manager,
                network,
                status: RwLock::new(status),
                emitter,
            }),
        }
    }

    pub fn from_config(
        config: &SyncConfig,
        manager: Arc<SyncManager>,
        network: Arc<NetworkMonitor>,
    ) -> Self {
        Self::new(config.mode(), config.poll_interval(), manager, network)
    }

    pub async fn status(&self) -> SyncStatus {
        self.shared.snapshot().await
    }

    /// Starts the agent's background tasks.
    ///
    /// In `disabled` mode nothing is spawned; the returned handle only
    /// reports status.
    pub fn start(self) -> SyncResult<SyncAgentHandle> {
        let mut handle = SyncAgentHandle {
            mode: self.mode,
            shared: self.shared.clone(),
            callback: None,
            tasks: Vec::new(),
        };

        if !self.mode.is_sync_enabled() {
            info!("Sync is disabled, agent not started");
            return Ok(handle);
        }
        if self.poll_interval.is_zero() {
            return Err(SyncError::InvalidConfig("poll interval must be positive".into()));
        }

        info!(mode = %self.mode, poll_secs = self.poll_interval.as_secs(), "Starting sync agent");

        let (request_tx, request_rx) = mpsc::channel(1);

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(drain_loop(self.shared.clone(), request_rx, shutdown_rx));
        handle.tasks.push((shutdown_tx, task));

        if self.mode.triggers_automatically() {
            // Reconnect producer.
            let shared = self.shared.clone();
            let tx = request_tx.clone();
            let callback = self.shared.network.add_callback(move |online| {
                if online {
                    shared.request(&tx, DrainTrigger::Reconnect);
                }
            });
            handle.callback = Some(callback);

            // Timer producer.
            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
            let task = tokio::spawn(timer_loop(
                self.shared.clone(),
                request_tx.clone(),
                self.poll_interval,
                shutdown_rx,
            ));
            handle.tasks.push((shutdown_tx, task));

            if self.shared.network.is_online() {
                self.shared.request(&request_tx, DrainTrigger::Startup);
            }
        }

        info!("Sync agent started");
        Ok(handle)
    }
}

async fn drain_loop(
    shared: Arc<AgentShared>,
    mut request_rx: mpsc::Receiver<DrainTrigger>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    loop {
        tokio::select! {
            Some(trigger) = request_rx.recv() => {
                if !shared.network.is_online() {
                    debug!(?trigger, "Offline, ignoring drain request");
                    continue;
                }
                debug!(?trigger, "Drain requested");
                shared.run_drain().await;
            }

            _ = shutdown_rx.recv() => {
                info!("Drain loop received shutdown");
                break;
            }
        }
    }
}

async fn timer_loop(
    shared: Arc<AgentShared>,
    request_tx: mpsc::Sender<DrainTrigger>,
    period: Duration,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if shared.network.is_online() {
                    shared.request(&request_tx, DrainTrigger::Timer);
                }
            }

            _ = shutdown_rx.recv() => {
                debug!("Timer loop received shutdown");
                break;
            }
        }
    }
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Controls a started agent.
pub struct SyncAgentHandle {
    mode: SyncMode,
    shared: Arc<AgentShared>,
    callback: Option<CallbackId>,
    tasks: Vec<(mpsc::Sender<()>, JoinHandle<()>)>,
}

impl SyncAgentHandle {
    pub async fn status(&self) -> SyncStatus {
        self.shared.snapshot().await
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Drains now, outside the automatic triggers.
    ///
    /// Returns [`DrainOutcome::Skipped`] when a drain is already running.
    pub async fn sync_now(&self) -> SyncResult<DrainOutcome> {
        if !self.mode.is_sync_enabled() {
            return Err(SyncError::InvalidConfig("sync is disabled".into()));
        }
        if !self.shared.network.is_online() {
            return Err(SyncError::RemoteUnavailable("device is offline".into()));
        }
        Ok(self.shared.run_drain().await)
    }

    /// Stops producers and the drain task, waiting for a running drain to
    /// finish.
    pub async fn shutdown(mut self) -> SyncResult<()> {
        info!("Shutting down sync agent");

        if let Some(id) = self.callback.take() {
            self.shared.network.remove_callback(id);
        }

        for (shutdown_tx, task) in self.tasks.drain(..) {
            // A task that already exited has dropped its receiver.
            let _ = shutdown_tx.send(()).await;
            task.await
                .map_err(|e| SyncError::Internal(format!("agent task failed: {e}")))?;
        }

        info!("Sync agent stopped");
        Ok(())
    }
}
