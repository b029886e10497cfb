//! # Repository Module
//!
//! Repositories keep every SQL statement of the queue in one place.
//!
//! ```text
//! tindahan-sync (SqliteOfflineQueue)
//!      │
//!      │  db.offline_mutations().list_unsynced(EntityType::Sale)
//!      ▼
//! OfflineMutationRepository ──► offline_mutations table
//! ```
//!
//! - [`mutation::OfflineMutationRepository`] - durable offline queue

pub mod mutation;
