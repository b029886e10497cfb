//! # tindahan-core: Pure Domain Logic for the Offline Sync Engine
//!
//! Everything the sync engine needs to reason about a queued mutation
//! without touching storage or the network.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Offline Sync Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 tindahan-sync (interceptor, manager)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tindahan-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  routing  │  │   cache   │  │ validation│  │   │
//! │  │   │ EntityType│  │ReplayRoute│  │CachePatch │  │  payload  │  │   │
//! │  │   │ Queued... │  │Resolution │  │apply_patch│  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                tindahan-db (SQLite offline queue)               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entity types, mutation actions, queued mutations
//! - [`routing`] - Maps (entity, action) pairs to remote replay routes
//! - [`ids`] - Queue and temporary record identifiers
//! - [`cache`] - Pure read-cache patch functions
//! - [`notification`] - User-visible sync notifications
//! - [`validation`] - Payload validation against the REST request shapes
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use tindahan_core::{EntityType, MutationAction, Resolution, ReplayRoute};
//!
//! let resolution = Resolution::resolve(EntityType::Inventory, MutationAction::Update);
//! assert_eq!(resolution, Resolution::Remote(ReplayRoute::AddStockMovement));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod ids;
pub mod notification;
pub mod routing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cache::{apply_patch, CachePatch};
pub use error::{CoreError, CoreResult, ValidationError};
pub use ids::{generate_queue_id, generate_temp_id, is_temp_id};
pub use notification::{Notification, NotificationKind};
pub use routing::{ReplayRoute, Resolution};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Prefix for identifiers of optimistic records that the server has not
/// assigned yet. Server ids never start with this prefix.
pub const TEMP_ID_PREFIX: &str = "temp_";

/// Record field holding the entity identifier in REST bodies and cached lists.
pub const ID_FIELD: &str = "_id";

/// Record field holding the owning store, used as the cache scope.
pub const SCOPE_FIELD: &str = "store";

/// Scope used for cached lists when a record carries no store.
pub const DEFAULT_SCOPE: &str = "default";

/// Interval between periodic drain attempts while online.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
