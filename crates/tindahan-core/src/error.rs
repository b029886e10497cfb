//! # Error Types
//!
//! Domain-specific error types for tindahan-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tindahan-core errors (this file)                                      │
//! │  ├── CoreError        - Routing and parsing failures                   │
//! │  └── ValidationError  - Payload validation failures                    │
//! │                                                                         │
//! │  tindahan-db errors (separate crate)                                   │
//! │  └── DbError          - Queue storage failures                         │
//! │                                                                         │
//! │  tindahan-sync errors (separate crate)                                 │
//! │  └── SyncError        - Storage / replay / notification failures       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → caller                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::{EntityType, MutationAction};

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised before a mutation reaches the queue.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("Unknown mutation action: {0}")]
    UnknownAction(String),

    /// The (entity, action) pair has no remote counterpart.
    ///
    /// ## When This Occurs
    /// - Deleting a stock movement
    /// - Updating or deleting a sale or a report
    #[error("{action} is not supported for {entity_type}")]
    UnsupportedMutation {
        entity_type: EntityType,
        action: MutationAction,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Payload validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Wrong JSON type or shape.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }

    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_message() {
        let err = CoreError::UnsupportedMutation {
            entity_type: EntityType::Sale,
            action: MutationAction::Delete,
        };
        assert_eq!(err.to_string(), "delete is not supported for sale");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("name").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: name is required");
    }
}
