//! # Offline Action Interceptor
//!
//! Decides whether a mutation proceeds online or is diverted into the
//! durable queue.
//!
//! ## Offline Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  intercept(entity, action, payload)                                    │
//! │       │                                                                 │
//! │       ├── online? ──────────────────────────────► Ok(false), no effect │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. resolve route ── Unsupported ──────────────► Err(InvalidMutation)  │
//! │  2. validate payload ── invalid ───────────────► Err(InvalidMutation)  │
//! │  3. build optimistic patch (temp id for creates), pick cached list    │
//! │  4. enqueue ── storage error ──────────────────► Err(StorageFailure)   │
//! │  5. patch read cache                               (cache untouched)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Ok(true)                                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Creates land in the list of the payload's `store`. Updates and deletes
//! are partial, so they patch whichever cached list already holds their
//! `_id`; the chosen scope is stored with the queued item.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::cache::{CacheKey, ReadCache};
use crate::error::SyncResult;
use crate::network::NetworkMonitor;
use crate::queue::OfflineQueue;
use tindahan_core::cache::{optimistic_create, optimistic_update, record_id, record_scope};
use tindahan_core::validation::validate_payload;
use tindahan_core::{
    generate_temp_id, CachePatch, CoreError, EntityType, MutationAction, NewMutation, Resolution,
    ValidationError, ID_FIELD, SCOPE_FIELD,
};

/// A validated mutation together with its optimistic cache change.
#[derive(Debug, Clone)]
pub(crate) struct PreparedMutation {
    pub resolution: Resolution,
    pub key: CacheKey,
    pub patch: CachePatch,
    pub temp_id: Option<String>,
}

/// Checks a mutation and derives the cache patch that shows it locally.
pub(crate) fn prepare(
    cache: &ReadCache,
    entity_type: EntityType,
    action: MutationAction,
    payload: &Value,
) -> SyncResult<PreparedMutation> {
    let resolution = Resolution::resolve(entity_type, action);
    let inserts_record = match resolution {
        Resolution::Remote(route) => route.creates_record(),
        Resolution::LocalOnly => true,
        Resolution::Unsupported => {
            return Err(CoreError::UnsupportedMutation {
                entity_type,
                action,
            }
            .into())
        }
    };
    validate_payload(entity_type, action, payload).map_err(CoreError::from)?;

    let now = Utc::now();

    if inserts_record {
        let key = CacheKey::new(entity_type, record_scope(payload));
        let temp_id = generate_temp_id();
        let record = optimistic_create(payload, &temp_id, now);
        return Ok(PreparedMutation {
            resolution,
            key,
            patch: CachePatch::InsertIfAbsent(record),
            temp_id: Some(temp_id),
        });
    }

    let id = record_id(payload)
        .ok_or_else(|| CoreError::from(ValidationError::required(ID_FIELD)))?
        .to_string();
    let key = CacheKey::new(entity_type, target_scope(cache, entity_type, payload, &id));
    let patch = match action {
        MutationAction::Delete => CachePatch::Remove { id },
        MutationAction::Create | MutationAction::Update => CachePatch::Merge {
            id,
            fields: optimistic_update(payload, now),
        },
    };

    Ok(PreparedMutation {
        resolution,
        key,
        patch,
        temp_id: None,
    })
}

/// Scope of the list an update or delete applies to: the payload's own
/// `store` when given, else the cached list holding the record.
fn target_scope(cache: &ReadCache, entity_type: EntityType, payload: &Value, id: &str) -> String {
    match payload.get(SCOPE_FIELD).and_then(Value::as_str) {
        Some(scope) => scope.to_string(),
        None => cache
            .scope_of(entity_type, id)
            .unwrap_or_else(|| record_scope(payload).to_string()),
    }
}

/// Receipt for a mutation diverted into the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedOffline {
    pub queue_id: String,
    /// Id of the optimistic record, for creates.
    pub temp_id: Option<String>,
}

/// Diverts mutations into the durable queue while offline.
pub struct OfflineInterceptor {
    network: Arc<NetworkMonitor>,
    queue: Arc<dyn OfflineQueue>,
    cache: Arc<ReadCache>,
}

impl OfflineInterceptor {
    pub fn new(
        network: Arc<NetworkMonitor>,
        queue: Arc<dyn OfflineQueue>,
        cache: Arc<ReadCache>,
    ) -> Self {
        OfflineInterceptor {
            network,
            queue,
            cache,
        }
    }

    /// Returns `Ok(true)` when the mutation was queued offline and
    /// `Ok(false)` when the caller must perform it online.
    pub async fn intercept(
        &self,
        entity_type: EntityType,
        action: MutationAction,
        payload: Value,
    ) -> SyncResult<bool> {
        if self.network.is_online() {
            return Ok(false);
        }
        self.queue_offline(entity_type, action, payload).await?;
        Ok(true)
    }

    /// Queues a mutation regardless of network state and shows it in the
    /// read cache.
    pub async fn queue_offline(
        &self,
        entity_type: EntityType,
        action: MutationAction,
        payload: Value,
    ) -> SyncResult<QueuedOffline> {
        let prepared = prepare(&self.cache, entity_type, action, &payload)?;

        let mut mutation = NewMutation::new(entity_type, action, payload)
            .with_cache_scope(prepared.key.scope.clone());
        if let Some(temp_id) = &prepared.temp_id {
            mutation = mutation.with_temp_id(temp_id.clone());
        }

        let queue_id = match self.queue.enqueue(mutation).await {
            Ok(id) => id,
            Err(e) => {
                error!(
                    entity = %entity_type,
                    %action,
                    error = %e,
                    "Failed to queue offline mutation"
                );
                return Err(e);
            }
        };

        self.cache.apply(&prepared.key, &prepared.patch);

        info!(
            id = %queue_id,
            entity = %entity_type,
            %action,
            temp_id = ?prepared.temp_id,
            scope = %prepared.key.scope,
            "Queued mutation for offline sync"
        );

        Ok(QueuedOffline {
            queue_id,
            temp_id: prepared.temp_id,
        })
    }
}
