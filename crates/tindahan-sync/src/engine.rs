//! # Sync Engine Assembly
//!
//! Wires the queue, monitor, cache, remote client, notifier, manager and
//! gateway from a [`SyncConfig`].
//!
//! ```text
//! SyncEngineBuilder::new(config)
//!     .with_database(db)        // default: open config.database_path()
//!     .with_remote(api)         // default: HttpRemoteApi
//!     .with_feed(feed)          // default: HttpNotificationFeed
//!     .initially_online(false)  // default: offline until a signal arrives
//!     .build().await?
//! ```

use std::sync::Arc;
use tracing::info;

use crate::agent::SyncAgent;
use crate::cache::ReadCache;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::gateway::MutationGateway;
use crate::interceptor::OfflineInterceptor;
use crate::manager::SyncManager;
use crate::network::NetworkMonitor;
use crate::notify::{HttpNotificationFeed, NotificationFeed, Notifier};
use crate::probe::ConnectivityProbe;
use crate::queue::SqliteOfflineQueue;
use crate::remote::{ApiClient, HttpRemoteApi, RemoteApi};
use tindahan_db::{Database, DbConfig};

/// Fully wired sync components sharing one queue, monitor and cache.
pub struct SyncEngine {
    config: SyncConfig,
    db: Database,
    queue: Arc<SqliteOfflineQueue>,
    network: Arc<NetworkMonitor>,
    cache: Arc<ReadCache>,
    manager: Arc<SyncManager>,
    gateway: MutationGateway,
}

impl SyncEngine {
    pub fn builder(config: SyncConfig) -> SyncEngineBuilder {
        SyncEngineBuilder::new(config)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn queue(&self) -> &Arc<SqliteOfflineQueue> {
        &self.queue
    }

    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    pub fn cache(&self) -> &Arc<ReadCache> {
        &self.cache
    }

    pub fn manager(&self) -> &Arc<SyncManager> {
        &self.manager
    }

    pub fn gateway(&self) -> &MutationGateway {
        &self.gateway
    }

    pub fn interceptor(&self) -> &OfflineInterceptor {
        self.gateway.interceptor()
    }

    /// A not-yet-started agent using the configured mode and interval.
    pub fn agent(&self) -> SyncAgent {
        SyncAgent::from_config(&self.config, self.manager.clone(), self.network.clone())
    }

    /// A not-yet-started probe feeding this engine's monitor.
    pub fn probe(&self) -> SyncResult<ConnectivityProbe> {
        ConnectivityProbe::from_config(&self.config, self.network.clone())
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

pub struct SyncEngineBuilder {
    config: SyncConfig,
    db: Option<Database>,
    remote: Option<Arc<dyn RemoteApi>>,
    feed: Option<Arc<dyn NotificationFeed>>,
    initially_online: bool,
}

impl SyncEngineBuilder {
    pub fn new(config: SyncConfig) -> Self {
        SyncEngineBuilder {
            config,
            db: None,
            remote: None,
            feed: None,
            initially_online: false,
        }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteApi>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_feed(mut self, feed: Arc<dyn NotificationFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn initially_online(mut self, online: bool) -> Self {
        self.initially_online = online;
        self
    }

    pub async fn build(self) -> SyncResult<SyncEngine> {
        let config = self.config;

        let db = match self.db {
            Some(db) => db,
            None => {
                let path = config.database_path();
                info!(?path, "Opening offline queue database");
                Database::new(DbConfig::new(path)).await?
            }
        };

        let remote: Arc<dyn RemoteApi> = match self.remote {
            Some(remote) => remote,
            None => Arc::new(HttpRemoteApi::from_config(&config)?),
        };
        let feed: Arc<dyn NotificationFeed> = match self.feed {
            Some(feed) => feed,
            None => Arc::new(HttpNotificationFeed::new(ApiClient::from_config(&config)?)),
        };

        let queue = Arc::new(SqliteOfflineQueue::new(&db));
        let network = Arc::new(NetworkMonitor::new(self.initially_online));
        let cache = Arc::new(ReadCache::new());

        let manager = Arc::new(
            SyncManager::new(queue.clone(), remote.clone(), cache.clone(), Notifier::new(feed))
                .with_notification_scope(config.store_id().map(str::to_owned)),
        );
        let interceptor = OfflineInterceptor::new(network.clone(), queue.clone(), cache.clone());
        let gateway = MutationGateway::new(network.clone(), interceptor, remote, cache.clone());

        Ok(SyncEngine {
            config,
            db,
            queue,
            network,
            cache,
            manager,
            gateway,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::InMemoryFeed;
    use crate::queue::OfflineQueue;
    use crate::testing::ScriptedRemote;
    use serde_json::json;
    use tindahan_core::{EntityType, MutationAction};

    #[tokio::test]
    async fn test_builder_wires_shared_components() {
        let engine = SyncEngine::builder(SyncConfig::default())
            .with_database(Database::new(DbConfig::in_memory()).await.unwrap())
            .with_remote(Arc::new(ScriptedRemote::default()))
            .with_feed(Arc::new(InMemoryFeed::default()))
            .build()
            .await
            .unwrap();

        assert!(!engine.network().is_online());

        let handled = engine
            .interceptor()
            .intercept(EntityType::Sale, MutationAction::Create, json!({
                "store": "s1",
                "items": [{"product": "p1", "quantity": 1}],
                "total": 5,
                "paymentMethod": "cash"
            }))
            .await
            .unwrap();
        assert!(handled);
        assert_eq!(engine.queue().count_unsynced(EntityType::Sale).await.unwrap(), 1);
        assert_eq!(engine.manager().pending_total().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_default_database_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SyncConfig::default();
        config.storage.db_path = Some(dir.path().join("queue.db"));

        let engine = SyncEngine::builder(config)
            .with_feed(Arc::new(InMemoryFeed::default()))
            .build()
            .await
            .unwrap();

        assert!(engine.database().health_check().await);
        assert!(dir.path().join("queue.db").exists());
        engine.close().await;
    }
}
