//! # Read Cache
//!
//! In-memory lists of entity records as the UI last saw them, keyed by
//! entity type and store scope. Offline mutations patch these lists
//! optimistically; a drain reconciles them with server records.
//!
//! ```text
//! CacheKey { entity: Category, scope: "store-1" }
//!     └── entry: records = [ {_id:"c1",…}, {_id:"temp_…",…} ], stale = false
//! ```
//!
//! A stale entry still serves its records; staleness only tells readers
//! that a refetch from the server is due.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use tindahan_core::cache::record_id;
use tindahan_core::{apply_patch, CachePatch, EntityType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity: EntityType,
    pub scope: String,
}

impl CacheKey {
    pub fn new(entity: EntityType, scope: impl Into<String>) -> Self {
        CacheKey {
            entity,
            scope: scope.into(),
        }
    }
}

#[derive(Debug, Default)]
struct CacheEntry {
    records: Vec<Value>,
    stale: bool,
}

/// Shared read cache. Cheap to lock; never held across an await.
#[derive(Debug, Default)]
pub struct ReadCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl ReadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a list with fresh server data and clears its stale flag.
    pub fn load(&self, key: CacheKey, records: Vec<Value>) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.insert(
            key,
            CacheEntry {
                records,
                stale: false,
            },
        );
    }

    /// Current records for a key. Empty when nothing is cached.
    pub fn snapshot(&self, key: &CacheKey) -> Vec<Value> {
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .map(|entry| entry.records.clone())
            .unwrap_or_default()
    }

    /// Applies a patch to one list, creating the list if needed.
    pub fn apply(&self, key: &CacheKey, patch: &CachePatch) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let entry = entries.entry(key.clone()).or_default();
        entry.records = apply_patch(&entry.records, patch);
        debug!(entity = %key.entity, scope = %key.scope, key = ?patch.key(), "Applied cache patch");
    }

    pub fn contains(&self, key: &CacheKey, id: &str) -> bool {
        self.find(key, id).is_some()
    }

    /// The record keyed by `id` in one list.
    pub fn find(&self, key: &CacheKey, id: &str) -> Option<Value> {
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)?
            .records
            .iter()
            .find(|r| record_id(r) == Some(id))
            .cloned()
    }

    /// The scope of the list holding `id` for an entity type. When several
    /// lists hold it, the lexically smallest scope wins.
    pub fn scope_of(&self, entity: EntityType, id: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|(key, entry)| {
                key.entity == entity && entry.records.iter().any(|r| record_id(r) == Some(id))
            })
            .map(|(key, _)| key.scope.clone())
            .min()
    }

    /// Marks every scope of an entity type stale.
    pub fn invalidate(&self, entity: EntityType) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        for (key, entry) in entries.iter_mut() {
            if key.entity == entity {
                entry.stale = true;
            }
        }
    }

    /// True when the list was invalidated since its last load. Lists never
    /// loaded count as stale.
    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .map(|entry| entry.stale)
            .unwrap_or(true)
    }
}
