//! # Mutation Gateway
//!
//! Single entry point for UI mutations. Offline, the mutation is handed to
//! the [`OfflineInterceptor`]; online, it is shown optimistically, sent to
//! the server, then reconciled or rolled back.
//!
//! ## Online Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  optimistic patch ──► remote call ──┬── Ok(record) ──► Replace temp/id │
//! │  (remember previous)                │                  invalidate       │
//! │                                     │                                   │
//! │                                     └── Err ─────────► create: Remove   │
//! │                                                        update: restore  │
//! │                                                        delete: reinsert │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reports never reach the server; they are queued in both modes. Edits of a
//! record still carrying its temp id are queued too, behind its create, so
//! replay can send them with the server id.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::ReadCache;
use crate::error::{SyncError, SyncResult};
use crate::interceptor::{prepare, OfflineInterceptor, QueuedOffline};
use crate::network::NetworkMonitor;
use crate::remote::{dispatch, RemoteApi};
use tindahan_core::cache::record_id;
use tindahan_core::{is_temp_id, CachePatch, EntityType, MutationAction, Resolution};

/// What happened to a submitted mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Accepted by the server; carries its record.
    Applied(Value),
    /// Stored in the offline queue for later replay.
    Queued(QueuedOffline),
}

pub struct MutationGateway {
    network: Arc<NetworkMonitor>,
    interceptor: OfflineInterceptor,
    remote: Arc<dyn RemoteApi>,
    cache: Arc<ReadCache>,
}

impl MutationGateway {
    pub fn new(
        network: Arc<NetworkMonitor>,
        interceptor: OfflineInterceptor,
        remote: Arc<dyn RemoteApi>,
        cache: Arc<ReadCache>,
    ) -> Self {
        MutationGateway {
            network,
            interceptor,
            remote,
            cache,
        }
    }

    pub fn interceptor(&self) -> &OfflineInterceptor {
        &self.interceptor
    }

    pub async fn submit(
        &self,
        entity_type: EntityType,
        action: MutationAction,
        payload: Value,
    ) -> SyncResult<MutationOutcome> {
        let local_only = matches!(Resolution::resolve(entity_type, action), Resolution::LocalOnly);
        let awaits_create =
            action != MutationAction::Create && record_id(&payload).is_some_and(is_temp_id);
        if local_only || awaits_create || !self.network.is_online() {
            return self
                .interceptor
                .queue_offline(entity_type, action, payload)
                .await
                .map(MutationOutcome::Queued);
        }

        let prepared = prepare(&self.cache, entity_type, action, &payload)?;
        let Some(route) = prepared.resolution.route() else {
            return Err(SyncError::Internal(format!(
                "{entity_type} {action} has no remote route"
            )));
        };

        let key = &prepared.key;
        let previous = prepared.patch.key().and_then(|id| self.cache.find(key, id));

        self.cache.apply(key, &prepared.patch);

        match dispatch(self.remote.as_ref(), route, &payload).await {
            Ok(record) => {
                if let (Some(id), Some(_)) = (prepared.patch.key(), record_id(&record)) {
                    if !matches!(prepared.patch, CachePatch::Remove { .. }) {
                        self.cache.apply(
                            key,
                            &CachePatch::Replace {
                                id: id.to_string(),
                                record: record.clone(),
                            },
                        );
                    }
                }
                for entity in entity_type.invalidates() {
                    self.cache.invalidate(*entity);
                }
                debug!(%route, "Mutation applied online");
                Ok(MutationOutcome::Applied(record))
            }
            Err(e) => {
                warn!(%route, error = %e, "Online mutation failed, rolling back");
                if let Some(rollback) = rollback_patch(&prepared.patch, previous) {
                    self.cache.apply(key, &rollback);
                }
                Err(e)
            }
        }
    }
}

/// The patch undoing `applied`, given the record it displaced.
fn rollback_patch(applied: &CachePatch, previous: Option<Value>) -> Option<CachePatch> {
    match applied {
        CachePatch::InsertIfAbsent(record) => record_id(record).map(|id| CachePatch::Remove {
            id: id.to_string(),
        }),
        CachePatch::Merge { id, .. } | CachePatch::Replace { id, .. } => {
            previous.map(|record| CachePatch::Replace {
                id: id.clone(),
                record,
            })
        }
        CachePatch::Remove { .. } => previous.map(CachePatch::InsertIfAbsent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;
    use crate::queue::{OfflineQueue, SqliteOfflineQueue};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tindahan_db::{Database, DbConfig};

    /// Answers every call with the payload plus a server id, or fails.
    struct FakeRemote {
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeRemote {
        fn new(fail: bool) -> Self {
            FakeRemote {
                fail,
                calls: AtomicUsize::new(0),
            }
        }

        fn answer(&self, payload: &Value) -> SyncResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SyncError::RemoteRejected {
                    status: 400,
                    message: "rejected".into(),
                });
            }
            let mut record = payload.clone();
            if record.get("_id").is_none() {
                record["_id"] = json!("srv1");
            }
            Ok(record)
        }
    }

    #[async_trait]
    impl RemoteApi for FakeRemote {
        async fn create_product(&self, p: &Value) -> SyncResult<Value> {
            self.answer(p)
        }
        async fn update_product(&self, p: &Value) -> SyncResult<Value> {
            self.answer(p)
        }
        async fn delete_product(&self, id: &str) -> SyncResult<Value> {
            self.answer(&json!({"_id": id}))
        }
        async fn create_category(&self, p: &Value) -> SyncResult<Value> {
            self.answer(p)
        }
        async fn update_category(&self, p: &Value) -> SyncResult<Value> {
            self.answer(p)
        }
        async fn delete_category(&self, id: &str) -> SyncResult<Value> {
            self.answer(&json!({"_id": id}))
        }
        async fn add_stock_movement(&self, p: &Value) -> SyncResult<Value> {
            self.answer(p)
        }
        async fn create_sale(&self, p: &Value) -> SyncResult<Value> {
            self.answer(p)
        }
    }

    struct Fixture {
        gateway: MutationGateway,
        remote: Arc<FakeRemote>,
        cache: Arc<ReadCache>,
        queue: Arc<SqliteOfflineQueue>,
        _db: Database,
    }

    fn drinks() -> Value {
        json!({"name": "Drinks", "store": "s1"})
    }

    async fn fixture(online: bool, fail: bool) -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let queue = Arc::new(SqliteOfflineQueue::new(&db));
        let network = Arc::new(NetworkMonitor::new(online));
        let cache = Arc::new(ReadCache::new());
        let remote = Arc::new(FakeRemote::new(fail));
        let interceptor = OfflineInterceptor::new(network.clone(), queue.clone(), cache.clone());
        let gateway = MutationGateway::new(network, interceptor, remote.clone(), cache.clone());
        Fixture {
            gateway,
            remote,
            cache,
            queue,
            _db: db,
        }
    }

    #[tokio::test]
    async fn test_online_create_reconciles_with_server_record() {
        let f = fixture(true, false).await;
        let outcome = f
            .gateway
            .submit(EntityType::Category, MutationAction::Create, drinks())
            .await
            .unwrap();

        assert!(matches!(outcome, MutationOutcome::Applied(_)));
        let records = f.cache.snapshot(&CacheKey::new(EntityType::Category, "s1"));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["_id"], "srv1");
        assert!(f.queue.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_online_create_failure_removes_optimistic_record() {
        let f = fixture(true, true).await;
        let err = f
            .gateway
            .submit(EntityType::Category, MutationAction::Create, drinks())
            .await
            .unwrap_err();

        assert!(err.is_replay_failure());
        assert!(f.cache.snapshot(&CacheKey::new(EntityType::Category, "s1")).is_empty());
    }

    #[tokio::test]
    async fn test_online_update_failure_restores_previous() {
        let f = fixture(true, true).await;
        let key = CacheKey::new(EntityType::Product, tindahan_core::DEFAULT_SCOPE);
        let original = json!({"_id": "p1", "name": "Soap", "price": 10});
        f.cache.load(key.clone(), vec![original.clone()]);

        f.gateway
            .submit(EntityType::Product, MutationAction::Update, json!({"_id": "p1", "price": 99}))
            .await
            .unwrap_err();

        assert_eq!(f.cache.snapshot(&key), vec![original]);
    }

    #[tokio::test]
    async fn test_online_partial_update_reaches_store_list() {
        let f = fixture(true, false).await;
        let key = CacheKey::new(EntityType::Product, "s1");
        f.cache.load(
            key.clone(),
            vec![json!({"_id": "p1", "name": "Soap", "price": 10, "store": "s1"})],
        );

        f.gateway
            .submit(
                EntityType::Product,
                MutationAction::Update,
                json!({"_id": "p1", "price": 12}),
            )
            .await
            .unwrap();

        let records = f.cache.snapshot(&key);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["price"], 12);
        assert!(f
            .cache
            .snapshot(&CacheKey::new(EntityType::Product, tindahan_core::DEFAULT_SCOPE))
            .is_empty());
    }

    #[tokio::test]
    async fn test_online_delete_failure_reinserts() {
        let f = fixture(true, true).await;
        let key = CacheKey::new(EntityType::Category, tindahan_core::DEFAULT_SCOPE);
        f.cache.load(key.clone(), vec![json!({"_id": "c1"})]);

        f.gateway
            .submit(EntityType::Category, MutationAction::Delete, json!({"_id": "c1"}))
            .await
            .unwrap_err();

        assert!(f.cache.contains(&key, "c1"));
    }

    #[tokio::test]
    async fn test_offline_submit_is_queued() {
        let f = fixture(false, false).await;
        let outcome = f
            .gateway
            .submit(EntityType::Category, MutationAction::Create, drinks())
            .await
            .unwrap();

        assert!(matches!(outcome, MutationOutcome::Queued(_)));
        assert_eq!(f.remote.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.queue.count_unsynced(EntityType::Category).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_online_edit_of_unsynced_record_is_queued() {
        let f = fixture(true, false).await;
        let key = CacheKey::new(EntityType::Category, "s1");
        f.cache.load(
            key.clone(),
            vec![json!({"_id": "temp_1_abc", "name": "Drinks", "store": "s1"})],
        );

        let outcome = f
            .gateway
            .submit(
                EntityType::Category,
                MutationAction::Update,
                json!({"_id": "temp_1_abc", "name": "Juice"}),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, MutationOutcome::Queued(_)));
        assert_eq!(f.remote.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.cache.snapshot(&key)[0]["name"], "Juice");

        let pending = f.queue.list_unsynced(EntityType::Category).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].cache_scope.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_report_is_local_even_online() {
        let f = fixture(true, false).await;
        let outcome = f
            .gateway
            .submit(EntityType::Report, MutationAction::Create, json!({"title": "Daily"}))
            .await
            .unwrap();

        assert!(matches!(outcome, MutationOutcome::Queued(_)));
        assert_eq!(f.remote.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rollback_patch() {
        let insert = CachePatch::InsertIfAbsent(json!({"_id": "temp_1"}));
        assert_eq!(
            rollback_patch(&insert, None),
            Some(CachePatch::Remove { id: "temp_1".into() })
        );

        let merge = CachePatch::Merge {
            id: "p1".into(),
            fields: json!({}),
        };
        assert_eq!(rollback_patch(&merge, None), None);
    }
}
