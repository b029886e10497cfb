//! In-memory fakes for the queue and remote seams, shared by unit tests.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::error::{SyncError, SyncResult};
use crate::queue::OfflineQueue;
use crate::remote::RemoteApi;
use tindahan_core::{EntityType, MutationAction, NewMutation, QueuedMutation};
use tindahan_db::DbError;

/// Queue kept in a `Vec`. Listing fails for the entity type set in
/// `unlistable`.
#[derive(Default)]
pub(crate) struct MemoryQueue {
    pub items: Mutex<Vec<QueuedMutation>>,
    pub failures: Mutex<Vec<(String, String)>>,
    pub unlistable: Mutex<Option<EntityType>>,
}

impl MemoryQueue {
    pub fn push(
        &self,
        entity_type: EntityType,
        action: MutationAction,
        payload: Value,
        temp_id: Option<&str>,
    ) -> String {
        self.push_scoped(entity_type, action, payload, temp_id, None)
    }

    pub fn push_scoped(
        &self,
        entity_type: EntityType,
        action: MutationAction,
        payload: Value,
        temp_id: Option<&str>,
        cache_scope: Option<&str>,
    ) -> String {
        let mut items = self.items.lock().unwrap();
        let id = format!("{}_{}", entity_type, items.len());
        items.push(QueuedMutation {
            id: id.clone(),
            entity_type,
            action,
            payload,
            temp_id: temp_id.map(str::to_owned),
            cache_scope: cache_scope.map(str::to_owned),
            created_at: Utc::now(),
            synced: false,
            attempts: 0,
            last_error: None,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

#[async_trait]
impl OfflineQueue for MemoryQueue {
    async fn enqueue(&self, m: NewMutation) -> SyncResult<String> {
        Ok(self.push_scoped(
            m.entity_type,
            m.action,
            m.payload,
            m.temp_id.as_deref(),
            m.cache_scope.as_deref(),
        ))
    }

    async fn list_unsynced(&self, entity_type: EntityType) -> SyncResult<Vec<QueuedMutation>> {
        if *self.unlistable.lock().unwrap() == Some(entity_type) {
            return Err(DbError::QueryFailed("disk I/O error".into()).into());
        }
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.entity_type == entity_type && !m.synced)
            .cloned()
            .collect())
    }

    async fn mark_synced(&self, id: &str) -> SyncResult<()> {
        for m in self.items.lock().unwrap().iter_mut().filter(|m| m.id == id) {
            m.synced = true;
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> SyncResult<()> {
        self.items.lock().unwrap().retain(|m| m.id != id);
        Ok(())
    }

    async fn record_failure(&self, id: &str, error: &str) -> SyncResult<()> {
        self.failures
            .lock()
            .unwrap()
            .push((id.to_string(), error.to_string()));
        Ok(())
    }

    async fn retarget(&self, entity_type: EntityType, from: &str, to: &str) -> SyncResult<u64> {
        let mut moved = 0;
        for m in self.items.lock().unwrap().iter_mut() {
            if m.entity_type == entity_type && !m.synced && m.retarget(from, to) {
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn count_unsynced(&self, entity_type: EntityType) -> SyncResult<i64> {
        Ok(self.list_unsynced(entity_type).await?.len() as i64)
    }

    async fn pending_counts(&self) -> SyncResult<Vec<(EntityType, i64)>> {
        let mut counts = Vec::new();
        for e in EntityType::ALL {
            let n = self.count_unsynced(e).await?;
            if n > 0 {
                counts.push((e, n));
            }
        }
        Ok(counts)
    }
}

/// Records every call. Payloads carrying `"fail": true` are refused; the
/// rest come back with `_id: "real123"` unless they already have an id.
/// With a gate set, each call waits for a permit before answering.
#[derive(Default)]
pub(crate) struct ScriptedRemote {
    pub calls: Mutex<Vec<Value>>,
    pub gate: Option<Arc<Notify>>,
}

impl ScriptedRemote {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn answer(&self, payload: &Value) -> SyncResult<Value> {
        self.calls.lock().unwrap().push(payload.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if payload.get("fail").and_then(Value::as_bool).unwrap_or(false) {
            return Err(SyncError::RemoteUnavailable("connection reset".into()));
        }
        let mut record = payload.clone();
        if record.get("_id").is_none() {
            record["_id"] = json!("real123");
        }
        Ok(record)
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn create_product(&self, p: &Value) -> SyncResult<Value> {
        self.answer(p).await
    }
    async fn update_product(&self, p: &Value) -> SyncResult<Value> {
        self.answer(p).await
    }
    async fn delete_product(&self, id: &str) -> SyncResult<Value> {
        self.answer(&json!({"_id": id})).await
    }
    async fn create_category(&self, p: &Value) -> SyncResult<Value> {
        self.answer(p).await
    }
    async fn update_category(&self, p: &Value) -> SyncResult<Value> {
        self.answer(p).await
    }
    async fn delete_category(&self, id: &str) -> SyncResult<Value> {
        self.answer(&json!({"_id": id})).await
    }
    async fn add_stock_movement(&self, p: &Value) -> SyncResult<Value> {
        self.answer(p).await
    }
    async fn create_sale(&self, p: &Value) -> SyncResult<Value> {
        self.answer(p).await
    }
}
