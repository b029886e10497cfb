//! # Domain Types
//!
//! Core types shared by the offline queue, the interceptor and the sync
//! manager.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │   EntityType    │   │ MutationAction  │   │   QueuedMutation    │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  Product        │   │  Create         │   │  id                 │   │
//! │  │  Category       │   │  Update         │   │  entity_type        │   │
//! │  │  Inventory      │   │  Delete         │   │  action             │   │
//! │  │  Sale           │   └─────────────────┘   │  payload (JSON)     │   │
//! │  │  Report         │                         │  temp_id            │   │
//! │  └─────────────────┘                         │  cache_scope        │   │
//! │                                              │  created_at         │   │
//! │                                              │  synced             │   │
//! │                                              └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::error::CoreError;
use crate::routing::Resolution;
use crate::{DEFAULT_SCOPE, ID_FIELD, SCOPE_FIELD};

// =============================================================================
// Entity Type
// =============================================================================

/// A domain object category subject to offline queuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Product,
    Category,
    /// Stock movements (in / out / adjustment).
    Inventory,
    Sale,
    /// Locally generated reports. Never replayed against the API.
    Report,
}

impl EntityType {
    /// Every entity type, in drain order.
    pub const ALL: [EntityType; 5] = [
        EntityType::Product,
        EntityType::Category,
        EntityType::Inventory,
        EntityType::Sale,
        EntityType::Report,
    ];

    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Product => "product",
            EntityType::Category => "category",
            EntityType::Inventory => "inventory",
            EntityType::Sale => "sale",
            EntityType::Report => "report",
        }
    }

    /// Returns true if some mutation of this type is replayed remotely.
    pub fn is_replayable(&self) -> bool {
        [MutationAction::Create, MutationAction::Update, MutationAction::Delete]
            .into_iter()
            .any(|action| Resolution::resolve(*self, action).route().is_some())
    }

    /// Cached lists that become stale once a mutation of this type is
    /// accepted by the server.
    ///
    /// A sale or stock movement changes product stock levels, so the
    /// product lists are refreshed as well.
    pub fn invalidates(&self) -> &'static [EntityType] {
        match self {
            EntityType::Product => &[EntityType::Product],
            EntityType::Category => &[EntityType::Category],
            EntityType::Inventory => &[EntityType::Inventory, EntityType::Product],
            EntityType::Sale => &[EntityType::Sale, EntityType::Product],
            EntityType::Report => &[EntityType::Report],
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "product" | "products" => Ok(EntityType::Product),
            "category" | "categories" => Ok(EntityType::Category),
            "inventory" | "stock" | "movement" => Ok(EntityType::Inventory),
            "sale" | "sales" => Ok(EntityType::Sale),
            "report" | "reports" => Ok(EntityType::Report),
            other => Err(CoreError::UnknownEntityType(other.to_string())),
        }
    }
}

// =============================================================================
// Mutation Action
// =============================================================================

/// The kind of change a queued mutation applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

impl MutationAction {
    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationAction::Create => "create",
            MutationAction::Update => "update",
            MutationAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for MutationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MutationAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" | "add" => Ok(MutationAction::Create),
            "update" | "edit" => Ok(MutationAction::Update),
            "delete" | "remove" => Ok(MutationAction::Delete),
            other => Err(CoreError::UnknownAction(other.to_string())),
        }
    }
}

// =============================================================================
// Queued Mutation
// =============================================================================

/// One pending offline change, as persisted in the durable queue.
///
/// ## Lifecycle
/// ```text
/// enqueue (offline)  ──►  read by drain  ──►  remote accepted ──► mark synced ──► removed
///                                   │
///                                   └──────►  remote failed   ──► stays queued (retry)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    /// Locally generated identifier (`<entity>_<millis>_<random>`).
    pub id: String,

    pub entity_type: EntityType,

    pub action: MutationAction,

    /// Request body for the matching REST call, exactly as the caller
    /// submitted it.
    #[ts(type = "unknown")]
    pub payload: Value,

    /// Temporary id of the optimistic cache record created for this
    /// mutation, if any.
    pub temp_id: Option<String>,

    /// Store scope of the cached list the optimistic change was applied
    /// to. Partial update and delete payloads carry no `store`, so the
    /// list is resolved once at enqueue time and reused on reconcile.
    pub cache_scope: Option<String>,

    /// When the mutation was enqueued locally.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// False until the server has accepted the mutation.
    pub synced: bool,

    /// Number of failed replay attempts.
    pub attempts: i64,

    /// Error from the most recent failed replay.
    pub last_error: Option<String>,
}

impl QueuedMutation {
    /// Returns how this mutation is replayed.
    pub fn resolution(&self) -> Resolution {
        Resolution::resolve(self.entity_type, self.action)
    }

    /// Returns the `_id` carried by the payload (update/delete targets).
    pub fn target_id(&self) -> Option<&str> {
        self.payload.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Returns the cache scope of this mutation: the recorded one, else the
    /// payload's `store`, else the default scope.
    pub fn scope(&self) -> &str {
        self.cache_scope
            .as_deref()
            .or_else(|| self.payload.get(SCOPE_FIELD).and_then(Value::as_str))
            .unwrap_or(DEFAULT_SCOPE)
    }

    /// Points a payload that targets `from` at `to` instead. Used once the
    /// server has assigned a real id to a record created offline.
    ///
    /// Returns true when the payload was rewritten.
    pub fn retarget(&mut self, from: &str, to: &str) -> bool {
        if self.target_id() != Some(from) {
            return false;
        }
        match self.payload.as_object_mut() {
            Some(fields) => {
                fields.insert(ID_FIELD.to_string(), Value::String(to.to_string()));
                true
            }
            None => false,
        }
    }
}

/// A mutation about to be written to the durable queue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMutation {
    pub entity_type: EntityType,
    pub action: MutationAction,
    pub payload: Value,
    pub temp_id: Option<String>,
    pub cache_scope: Option<String>,
}

impl NewMutation {
    pub fn new(entity_type: EntityType, action: MutationAction, payload: Value) -> Self {
        NewMutation {
            entity_type,
            action,
            payload,
            temp_id: None,
            cache_scope: None,
        }
    }

    /// Links the mutation to the optimistic record it produced.
    pub fn with_temp_id(mut self, temp_id: impl Into<String>) -> Self {
        self.temp_id = Some(temp_id.into());
        self
    }

    /// Records which cached list shows the optimistic change.
    pub fn with_cache_scope(mut self, scope: impl Into<String>) -> Self {
        self.cache_scope = Some(scope.into());
        self
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
