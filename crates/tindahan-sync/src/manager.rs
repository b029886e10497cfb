//! # Sync Manager
//!
//! Replays queued mutations against the remote API.
//!
//! ## Drain Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  drain()                                                                │
//! │    │                                                                    │
//! │    ├── already draining? ──────────────────────► DrainOutcome::Skipped │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  join_all over entity types                                            │
//! │    │                                                                    │
//! │    │   product:   [m1 ──► m2 ──► m3]   oldest first, one at a time     │
//! │    │   category:  [m4 ──► m5]                                          │
//! │    │   inventory: [m6]                                                 │
//! │    │   sale:      []                                                   │
//! │    │   report:    [m7]                 local only, left queued         │
//! │    │                                                                    │
//! │    │   per item:  dispatch ─ Ok ─► mark_synced ─► remove ─► reconcile  │
//! │    │                        └ Err ─► record_failure, continue          │
//! │    ▼                                                                    │
//! │  synced > 0 ──► one success notification                               │
//! │  failed > 0 ──► one "will retry" alert                                 │
//! │  invalidate cached lists of types that synced                          │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  DrainOutcome::Completed(DrainReport)                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Records Created Offline
//! ```text
//! queue:  [create {name:"Drinks"} temp_id=temp_1]  [update {_id:"temp_1", name:"Juice"}]
//!
//! create accepted as real123
//!   ├── queue.retarget(temp_1 ──► real123)     later items now target real123
//!   └── cache: temp_1 renamed to real123, local edits kept while an edit waits
//!
//! update replayed as PUT categories/real123
//! ```
//!
//! An edit whose create has not been accepted yet is not sent; it counts
//! as failed and waits for the next drain.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheKey, ReadCache};
use crate::error::SyncResult;
use crate::notify::Notifier;
use crate::queue::OfflineQueue;
use crate::remote::{dispatch, RemoteApi};
use tindahan_core::cache::{adopt_server_id, record_id};
use tindahan_core::notification::{sync_failure_message, sync_success_message};
use tindahan_core::{
    is_temp_id, CachePatch, EntityType, MutationAction, NotificationKind, QueuedMutation,
    Resolution,
};

// =============================================================================
// Drain Results
// =============================================================================

/// Tally for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDrain {
    pub entity_type: EntityType,
    pub synced: usize,
    /// Items that stay queued. When the queue could not be listed, every
    /// pending item of the type (at least one).
    pub failed: usize,
    /// First listing or replay error.
    pub error: Option<String>,
}

impl EntityDrain {
    fn new(entity_type: EntityType) -> Self {
        EntityDrain {
            entity_type,
            synced: 0,
            failed: 0,
            error: None,
        }
    }
}

/// Summary of one drain cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DrainReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entities: Vec<EntityDrain>,
}

impl DrainReport {
    pub fn synced(&self) -> usize {
        self.entities.iter().map(|e| e.synced).sum()
    }

    pub fn failed(&self) -> usize {
        self.entities.iter().map(|e| e.failed).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.synced() == 0 && self.failed() == 0
    }

    /// First listing or replay error, for status display.
    pub fn first_error(&self) -> Option<&str> {
        self.entities.iter().find_map(|e| e.error.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrainOutcome {
    /// Another drain was running; nothing was done.
    Skipped,
    Completed(DrainReport),
}

/// What replaying one item did.
enum Replayed {
    /// Local-only mutation; nothing was sent.
    Kept,
    /// Accepted. Carries `(temp_id, server_id)` when the server assigned an
    /// id to a record created offline.
    Synced(Option<(String, String)>),
}

// =============================================================================
// In-Progress Guard
// =============================================================================

struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Sync Manager
// =============================================================================

pub struct SyncManager {
    queue: Arc<dyn OfflineQueue>,
    remote: Arc<dyn RemoteApi>,
    cache: Arc<ReadCache>,
    notifier: Notifier,
    notification_scope: Option<String>,
    draining: AtomicBool,
}

impl SyncManager {
    pub fn new(
        queue: Arc<dyn OfflineQueue>,
        remote: Arc<dyn RemoteApi>,
        cache: Arc<ReadCache>,
        notifier: Notifier,
    ) -> Self {
        SyncManager {
            queue,
            remote,
            cache,
            notifier,
            notification_scope: None,
            draining: AtomicBool::new(false),
        }
    }

    /// Tags drain notifications with a store id.
    pub fn with_notification_scope(mut self, scope: Option<String>) -> Self {
        self.notification_scope = scope;
        self
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub async fn pending_counts(&self) -> SyncResult<Vec<(EntityType, i64)>> {
        self.queue.pending_counts().await
    }

    pub async fn pending_total(&self) -> SyncResult<i64> {
        Ok(self.pending_counts().await?.iter().map(|(_, n)| n).sum())
    }

    /// Runs one drain cycle unless one is already running.
    pub async fn drain(&self) -> DrainOutcome {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            debug!("Drain already in progress, skipping");
            return DrainOutcome::Skipped;
        };

        let started_at = Utc::now();
        let entities = join_all(EntityType::ALL.iter().map(|e| self.drain_entity(*e))).await;

        let report = DrainReport {
            started_at,
            finished_at: Utc::now(),
            entities,
        };

        self.finish(&report).await;
        DrainOutcome::Completed(report)
    }

    async fn finish(&self, report: &DrainReport) {
        let (synced, failed) = (report.synced(), report.failed());
        let scope = self.notification_scope.as_deref();

        if synced > 0 {
            self.notifier
                .notify(sync_success_message(synced), NotificationKind::System, scope)
                .await;
        }
        if failed > 0 {
            self.notifier
                .notify(sync_failure_message(failed), NotificationKind::Alert, scope)
                .await;
        }

        for drained in report.entities.iter().filter(|e| e.synced > 0) {
            for entity in drained.entity_type.invalidates() {
                self.cache.invalidate(*entity);
            }
        }

        if report.is_empty() {
            debug!("Nothing to sync");
        } else {
            info!(synced, failed, "Drain cycle finished");
        }
    }

    async fn drain_entity(&self, entity_type: EntityType) -> EntityDrain {
        let mut tally = EntityDrain::new(entity_type);

        let mut items = match self.queue.list_unsynced(entity_type).await {
            Ok(items) => items,
            Err(e) => {
                error!(entity = %entity_type, error = %e, "Failed to list queued mutations");
                tally.failed = self.unlisted_count(entity_type).await;
                tally.error = Some(e.to_string());
                return tally;
            }
        };

        if !items.is_empty() {
            debug!(entity = %entity_type, count = items.len(), "Replaying queued mutations");
        }

        // temp id -> server id, for records created earlier in this drain
        let mut assigned: HashMap<String, String> = HashMap::new();

        for i in 0..items.len() {
            let edited_later = match items[i].temp_id.as_deref() {
                Some(temp_id) => items[i + 1..]
                    .iter()
                    .any(|m| m.target_id() == Some(temp_id)),
                None => false,
            };
            follow_assigned_id(&mut items[i], &assigned);

            match self.replay(&items[i], edited_later).await {
                Ok(Replayed::Synced(new_id)) => {
                    tally.synced += 1;
                    if let Some((temp_id, server_id)) = new_id {
                        self.retarget_pending(entity_type, &temp_id, &server_id).await;
                        assigned.insert(temp_id, server_id);
                    }
                }
                Ok(Replayed::Kept) => {}
                Err(message) => {
                    tally.failed += 1;
                    tally.error.get_or_insert(message);
                }
            }
        }

        tally
    }

    /// Pending count for a type whose items could not be listed.
    async fn unlisted_count(&self, entity_type: EntityType) -> usize {
        match self.queue.count_unsynced(entity_type).await {
            Ok(n) => usize::try_from(n).unwrap_or(0).max(1),
            Err(_) => 1,
        }
    }

    /// Points queued edits of a record created offline at its server id.
    async fn retarget_pending(&self, entity_type: EntityType, temp_id: &str, server_id: &str) {
        match self.queue.retarget(entity_type, temp_id, server_id).await {
            Ok(0) => {}
            Ok(count) => {
                debug!(entity = %entity_type, temp_id, server_id, count, "Retargeted queued edits")
            }
            Err(e) => error!(
                entity = %entity_type,
                temp_id,
                server_id,
                error = %e,
                "Failed to retarget queued edits"
            ),
        }
    }

    async fn replay(&self, item: &QueuedMutation, edited_later: bool) -> Result<Replayed, String> {
        let route = match item.resolution() {
            Resolution::Remote(route) => route,
            Resolution::LocalOnly => return Ok(Replayed::Kept),
            Resolution::Unsupported => {
                let message = format!("{} is not supported for {}", item.action, item.entity_type);
                self.note_failure(item, &message).await;
                return Err(message);
            }
        };

        if let Some(temp_id) = item.target_id().filter(|id| is_temp_id(id)) {
            let message = format!("waiting for {temp_id} to be created on the server");
            debug!(id = %item.id, %route, temp_id, "Holding edit of an unsynced record");
            self.note_failure(item, &message).await;
            return Err(message);
        }

        let record = match dispatch(self.remote.as_ref(), route, &item.payload).await {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    id = %item.id,
                    %route,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Replay failed, will retry"
                );
                let message = e.to_string();
                self.note_failure(item, &message).await;
                return Err(message);
            }
        };

        if let Err(e) = self.queue.mark_synced(&item.id).await {
            error!(id = %item.id, error = %e, "Replay accepted but could not be marked synced");
            return Err(e.to_string());
        }
        if let Err(e) = self.queue.remove(&item.id).await {
            warn!(id = %item.id, error = %e, "Synced mutation not removed; purged at next startup");
        }

        let new_id = match (&item.temp_id, record_id(&record)) {
            (Some(temp_id), Some(server_id)) => Some((temp_id.clone(), server_id.to_string())),
            _ => None,
        };

        self.reconcile(item, record, edited_later);
        debug!(id = %item.id, %route, "Replayed queued mutation");
        Ok(Replayed::Synced(new_id))
    }

    async fn note_failure(&self, item: &QueuedMutation, message: &str) {
        if let Err(e) = self.queue.record_failure(&item.id, message).await {
            error!(id = %item.id, error = %e, "Failed to record replay failure");
        }
    }

    /// Swaps the optimistic record for the server's. While later edits of
    /// a created record are still queued, only its id is swapped so the
    /// edits stay visible.
    fn reconcile(&self, item: &QueuedMutation, record: Value, edited_later: bool) {
        let key = CacheKey::new(item.entity_type, item.scope());

        let patch = match item.action {
            MutationAction::Delete => item.target_id().map(|id| CachePatch::Remove {
                id: id.to_string(),
            }),
            MutationAction::Create | MutationAction::Update => {
                let has_server_id = record_id(&record).is_some();
                match item.temp_id.as_deref().or_else(|| item.target_id()) {
                    Some(id) if has_server_id && edited_later => {
                        self.cache.find(&key, id).map(|local| CachePatch::Replace {
                            id: id.to_string(),
                            record: adopt_server_id(&local, &record),
                        })
                    }
                    Some(id) if has_server_id => Some(CachePatch::Replace {
                        id: id.to_string(),
                        record,
                    }),
                    _ => None,
                }
            }
        };

        if let Some(patch) = patch {
            self.cache.apply(&key, &patch);
        }
    }
}

/// Rewrites an item targeting a record created earlier in this drain.
fn follow_assigned_id(item: &mut QueuedMutation, assigned: &HashMap<String, String>) {
    let Some(server_id) = item.target_id().and_then(|id| assigned.get(id)).cloned() else {
        return;
    };
    if let Some(temp_id) = item.target_id().map(str::to_owned) {
        item.retarget(&temp_id, &server_id);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
