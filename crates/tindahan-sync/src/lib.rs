//! # tindahan-sync: Offline Sync Engine for Tindahan POS
//!
//! Keeps the POS usable without a connection: mutations made offline are
//! queued durably and shown optimistically, then replayed against the
//! store REST API once connectivity returns.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Offline Sync Engine                            │
//! │                                                                         │
//! │  UI mutation                                                            │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  ┌────────────────┐  offline  ┌────────────────┐   ┌────────────────┐  │
//! │  │ MutationGateway│ ────────► │ OfflineInter-  │──►│ OfflineQueue   │  │
//! │  │                │           │ ceptor         │   │ (SQLite)       │  │
//! │  └───────┬────────┘           └───────┬────────┘   └───────┬────────┘  │
//! │   online │                            │ patch              │ drain     │
//! │          ▼                            ▼                    ▼           │
//! │  ┌────────────────┐           ┌────────────────┐   ┌────────────────┐  │
//! │  │ RemoteApi      │ ◄──────── │ ReadCache      │◄──│ SyncManager    │  │
//! │  │ (reqwest)      │  replay   │                │   │                │  │
//! │  └────────────────┘           └────────────────┘   └───────┬────────┘  │
//! │                                                            │ notify    │
//! │  ┌────────────────┐  callbacks ┌────────────────┐          ▼           │
//! │  │ Connectivity   │ ─────────► │ NetworkMonitor │   ┌────────────────┐ │
//! │  │ Probe          │            │                │   │ Notifier       │ │
//! │  └────────────────┘            └───────┬────────┘   └────────────────┘ │
//! │                                        │ online                        │
//! │                                        ▼                               │
//! │                                ┌────────────────┐                      │
//! │                                │ SyncAgent      │ drain requests       │
//! │                                │ (timer+events) │ ──► SyncManager      │
//! │                                └────────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - `SyncAgent` lifecycle and drain triggers
//! - [`cache`] - Shared read cache of entity lists
//! - [`config`] - Sync configuration (mode, device, API, storage)
//! - [`engine`] - Wiring of all components from a config
//! - [`error`] - Sync error types
//! - [`gateway`] - Online/offline mutation entry point
//! - [`interceptor`] - Offline action interceptor
//! - [`manager`] - Drain cycle and reconciliation
//! - [`network`] - Online/offline state and callbacks
//! - [`notify`] - Notification feed and emitter
//! - [`probe`] - HTTP connectivity probe
//! - [`queue`] - Durable offline queue seam
//! - [`remote`] - REST client and route dispatch
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tindahan_sync::{SyncConfig, SyncEngine};
//!
//! let config = SyncConfig::load_or_default(None);
//! let engine = SyncEngine::builder(config).build().await?;
//!
//! let probe = engine.probe()?.spawn();
//! let agent = engine.agent().start()?;
//!
//! // UI mutations go through the gateway
//! engine.gateway().submit(EntityType::Category, MutationAction::Create, payload).await?;
//!
//! let status = agent.status().await;
//! println!("Pending: {}", status.pending_count);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod interceptor;
pub mod manager;
pub mod network;
pub mod notify;
pub mod probe;
pub mod queue;
pub mod remote;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{NoOpEmitter, SyncAgent, SyncAgentHandle, SyncEventEmitter, SyncStatus};
pub use cache::{CacheKey, ReadCache};
pub use config::{SyncConfig, SyncMode};
pub use engine::{SyncEngine, SyncEngineBuilder};
pub use error::{SyncError, SyncResult};
pub use gateway::{MutationGateway, MutationOutcome};
pub use interceptor::{OfflineInterceptor, QueuedOffline};
pub use manager::{DrainOutcome, DrainReport, EntityDrain, SyncManager};
pub use network::{CallbackId, NetworkMonitor};
pub use notify::{HttpNotificationFeed, InMemoryFeed, NotificationFeed, Notifier};
pub use probe::{ConnectivityProbe, ProbeHandle};
pub use queue::{OfflineQueue, SqliteOfflineQueue};
pub use remote::{dispatch, ApiClient, HttpRemoteApi, RemoteApi};
