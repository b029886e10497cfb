//! # Offline Queue
//!
//! The seam between the sync engine and durable storage.
//!
//! ```text
//! ┌──────────────────┐  enqueue    ┌──────────────────┐   INSERT   ┌─────────┐
//! │ OfflineInter-    │ ──────────► │ OfflineQueue     │ ─────────► │ SQLite  │
//! │ ceptor           │             │ (trait)          │            │ offline_│
//! └──────────────────┘             │                  │            │mutations│
//! ┌──────────────────┐ list/mark/  │ SqliteOffline-   │ ◄───────── │         │
//! │ SyncManager      │ ──remove──► │ Queue            │   SELECT   └─────────┘
//! └──────────────────┘             └──────────────────┘
//! ```
//!
//! The queue assigns ids and creation timestamps. Items come back per
//! entity type in the order they were enqueued.

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::SyncResult;
use tindahan_core::{generate_queue_id, EntityType, NewMutation, QueuedMutation};
use tindahan_db::{Database, OfflineMutationRepository};

/// Durable storage for mutations awaiting replay.
#[async_trait]
pub trait OfflineQueue: Send + Sync {
    /// Persists a mutation and returns its queue id. Nothing is stored
    /// when this fails.
    async fn enqueue(&self, mutation: NewMutation) -> SyncResult<String>;

    /// Unsynced mutations of one type, oldest first.
    async fn list_unsynced(&self, entity_type: EntityType) -> SyncResult<Vec<QueuedMutation>>;

    async fn mark_synced(&self, id: &str) -> SyncResult<()>;

    async fn remove(&self, id: &str) -> SyncResult<()>;

    /// Keeps the item queued and remembers why its replay failed.
    async fn record_failure(&self, id: &str, error: &str) -> SyncResult<()>;

    /// Rewrites `_id` from `from` to `to` in unsynced payloads of one type.
    /// Returns how many items now target `to`.
    async fn retarget(&self, entity_type: EntityType, from: &str, to: &str) -> SyncResult<u64>;

    async fn count_unsynced(&self, entity_type: EntityType) -> SyncResult<i64>;

    /// Unsynced counts per entity type, omitting empty types.
    async fn pending_counts(&self) -> SyncResult<Vec<(EntityType, i64)>>;
}

/// [`OfflineQueue`] backed by the SQLite `offline_mutations` table.
#[derive(Debug, Clone)]
pub struct SqliteOfflineQueue {
    repo: OfflineMutationRepository,
}

impl SqliteOfflineQueue {
    pub fn new(db: &Database) -> Self {
        SqliteOfflineQueue {
            repo: db.offline_mutations(),
        }
    }

    /// Drops rows already marked synced. Run at startup to finish removals
    /// interrupted by a crash.
    pub async fn purge_synced(&self) -> SyncResult<u64> {
        Ok(self.repo.purge_synced().await?)
    }

    /// All rows including synced ones, in insertion order.
    pub async fn all(&self) -> SyncResult<Vec<QueuedMutation>> {
        Ok(self.repo.get_all().await?)
    }
}

#[async_trait]
impl OfflineQueue for SqliteOfflineQueue {
    async fn enqueue(&self, mutation: NewMutation) -> SyncResult<String> {
        let queued = QueuedMutation {
            id: generate_queue_id(mutation.entity_type),
            entity_type: mutation.entity_type,
            action: mutation.action,
            payload: mutation.payload,
            temp_id: mutation.temp_id,
            cache_scope: mutation.cache_scope,
            created_at: Utc::now(),
            synced: false,
            attempts: 0,
            last_error: None,
        };
        self.repo.add(&queued).await?;
        debug!(
            id = %queued.id,
            entity = %queued.entity_type,
            action = %queued.action,
            "Enqueued offline mutation"
        );
        Ok(queued.id)
    }

    async fn list_unsynced(&self, entity_type: EntityType) -> SyncResult<Vec<QueuedMutation>> {
        Ok(self.repo.list_unsynced(entity_type).await?)
    }

    async fn mark_synced(&self, id: &str) -> SyncResult<()> {
        Ok(self.repo.mark_synced(id).await?)
    }

    async fn remove(&self, id: &str) -> SyncResult<()> {
        self.repo.delete(id).await?;
        Ok(())
    }

    async fn record_failure(&self, id: &str, error: &str) -> SyncResult<()> {
        Ok(self.repo.record_failure(id, error).await?)
    }

    async fn retarget(&self, entity_type: EntityType, from: &str, to: &str) -> SyncResult<u64> {
        Ok(self.repo.retarget_unsynced(entity_type, from, to).await?)
    }

    async fn count_unsynced(&self, entity_type: EntityType) -> SyncResult<i64> {
        Ok(self.repo.count_unsynced(entity_type).await?)
    }

    async fn pending_counts(&self) -> SyncResult<Vec<(EntityType, i64)>> {
        Ok(self.repo.unsynced_counts().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tindahan_core::MutationAction;
    use tindahan_db::DbConfig;

    async fn queue() -> (Database, SqliteOfflineQueue) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let queue = SqliteOfflineQueue::new(&db);
        (db, queue)
    }

    #[tokio::test]
    async fn test_enqueue_assigns_id_and_orders() {
        let (_db, queue) = queue().await;

        let create = |name: &str| {
            NewMutation::new(EntityType::Category, MutationAction::Create, json!({"name": name}))
        };
        let first = queue.enqueue(create("A")).await.unwrap();
        let second = queue.enqueue(create("B")).await.unwrap();

        assert!(first.starts_with("category_"));
        assert_ne!(first, second);

        let pending = queue.list_unsynced(EntityType::Category).await.unwrap();
        let names: Vec<_> = pending.iter().map(|m| m.payload["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(!pending[0].synced);
        assert_eq!(pending[0].attempts, 0);
    }

    #[tokio::test]
    async fn test_mark_remove_and_counts() {
        let (_db, queue) = queue().await;
        let id = queue
            .enqueue(
                NewMutation::new(
                    EntityType::Product,
                    MutationAction::Create,
                    json!({"name": "Soap"}),
                )
                .with_temp_id("temp_1_abc"),
            )
            .await
            .unwrap();
        queue
            .enqueue(NewMutation::new(EntityType::Sale, MutationAction::Create, json!({})))
            .await
            .unwrap();

        assert_eq!(queue.count_unsynced(EntityType::Product).await.unwrap(), 1);
        assert_eq!(queue.pending_counts().await.unwrap().len(), 2);

        queue.mark_synced(&id).await.unwrap();
        assert_eq!(queue.count_unsynced(EntityType::Product).await.unwrap(), 0);
        assert_eq!(queue.all().await.unwrap().len(), 2);

        queue.remove(&id).await.unwrap();
        assert_eq!(queue.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_failure_keeps_item() {
        let (_db, queue) = queue().await;
        let delete = NewMutation::new(
            EntityType::Category,
            MutationAction::Delete,
            json!({"_id": "c1"}),
        );
        let id = queue.enqueue(delete).await.unwrap();

        queue.record_failure(&id, "Remote unavailable").await.unwrap();

        let pending = queue.list_unsynced(EntityType::Category).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("Remote unavailable"));
    }

    #[tokio::test]
    async fn test_scope_is_stored_and_targets_follow_server_id() {
        let (_db, queue) = queue().await;
        let update = NewMutation::new(
            EntityType::Product,
            MutationAction::Update,
            json!({"_id": "temp_1_abc", "price": 12}),
        )
        .with_cache_scope("s1");
        queue.enqueue(update).await.unwrap();

        let moved = queue
            .retarget(EntityType::Product, "temp_1_abc", "p77")
            .await
            .unwrap();
        assert_eq!(moved, 1);

        let pending = queue.list_unsynced(EntityType::Product).await.unwrap();
        assert_eq!(pending[0].target_id(), Some("p77"));
        assert_eq!(pending[0].scope(), "s1");
    }

    #[tokio::test]
    async fn test_purge_synced() {
        let (_db, queue) = queue().await;
        let id = queue
            .enqueue(NewMutation::new(EntityType::Sale, MutationAction::Create, json!({})))
            .await
            .unwrap();
        queue.mark_synced(&id).await.unwrap();

        assert_eq!(queue.purge_synced().await.unwrap(), 1);
        assert!(queue.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_on_closed_pool_is_storage_failure() {
        let (db, queue) = queue().await;
        db.close().await;

        let err = queue
            .enqueue(NewMutation::new(EntityType::Sale, MutationAction::Create, json!({})))
            .await
            .unwrap_err();
        assert!(err.is_storage_error());
    }
}
