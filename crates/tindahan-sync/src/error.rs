//! # Sync Error Types
//!
//! Error types for interception and replay.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Storage      │  │     Replay              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  StorageFailure │  │  RemoteRejected         │ │
//! │  │  MissingDeviceId│  │  (surfaced to   │  │  RemoteUnavailable      │ │
//! │  │  InvalidUrl     │  │   the caller)   │  │  (item stays queued)    │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │   Mutation      │  │  Notification   │                              │
//! │  │                 │  │                 │                              │
//! │  │  InvalidMutation│  │  Notification-  │                              │
//! │  │  (validation,   │  │  Failure        │                              │
//! │  │   unsupported)  │  │  (logged only)  │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A trigger arriving while a drain runs is not an error; see
//! [`crate::manager::DrainOutcome::Skipped`].

use thiserror::Error;

use tindahan_core::CoreError;
use tindahan_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all interception and replay failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Missing device ID.
    #[error("Device ID not configured. Run initial setup first.")]
    MissingDeviceId,

    /// Invalid API URL.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// The durable queue could not be read or written.
    ///
    /// ## When This Occurs
    /// - Database file unavailable or disk full
    /// - Pool closed during shutdown
    ///
    /// An offline mutation that hits this error was NOT queued.
    #[error("Offline storage failed: {0}")]
    StorageFailure(#[source] DbError),

    // =========================================================================
    // Mutation Errors
    // =========================================================================
    /// The mutation was rejected before any side effect.
    #[error("Invalid mutation: {0}")]
    InvalidMutation(#[from] CoreError),

    // =========================================================================
    // Replay Errors
    // =========================================================================
    /// The server answered with an error status.
    #[error("Remote rejected request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// The server could not be reached.
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Failed to encode or decode a JSON body.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Notification Errors
    // =========================================================================
    /// The notification feed refused a notification.
    #[error("Notification delivery failed: {0}")]
    NotificationFailure(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal sync error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Agent is shutting down.
    #[error("Sync agent is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        SyncError::StorageFailure(err)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

/// ## Error Mapping
/// ```text
/// status error (4xx/5xx)  → RemoteRejected
/// body decode error       → SerializationFailed
/// connect / timeout / …   → RemoteUnavailable
/// ```
impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            SyncError::RemoteRejected {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            SyncError::SerializationFailed(err.to_string())
        } else {
            SyncError::RemoteUnavailable(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if a later attempt may succeed without any change to
    /// the request.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::RemoteUnavailable(_) | SyncError::Timeout(_) => true,
            SyncError::RemoteRejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            SyncError::StorageFailure(db) => db.is_unavailable(),
            _ => false,
        }
    }

    /// Returns true if the durable queue failed.
    pub fn is_storage_error(&self) -> bool {
        matches!(self, SyncError::StorageFailure(_))
    }

    /// Returns true if a remote replay call failed.
    pub fn is_replay_failure(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteRejected { .. }
                | SyncError::RemoteUnavailable(_)
                | SyncError::Timeout(_)
                | SyncError::SerializationFailed(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingDeviceId
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
