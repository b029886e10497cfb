//! User-visible notifications produced by the sync engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Severity of a notification as rendered by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Informational, e.g. a completed sync.
    System,
    /// Needs attention, e.g. items that failed to sync.
    Alert,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::System => "system",
            NotificationKind::Alert => "alert",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the notification feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[ts(as = "String")]
    pub id: Uuid,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Store the notification belongs to. `None` means every store.
    pub scope: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(message: impl Into<String>, kind: NotificationKind, scope: Option<String>) -> Self {
        Notification {
            id: Uuid::new_v4(),
            message: message.into(),
            kind,
            scope,
            created_at: Utc::now(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(message, NotificationKind::System, None)
    }

    pub fn alert(message: impl Into<String>) -> Self {
        Self::new(message, NotificationKind::Alert, None)
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

fn items(count: usize) -> &'static str {
    if count == 1 {
        "item"
    } else {
        "items"
    }
}

/// Aggregate message emitted after a drain that synced `count` items.
pub fn sync_success_message(count: usize) -> String {
    format!("Successfully synchronized {} offline {}", count, items(count))
}

/// Aggregate message emitted after a drain in which `count` items failed.
pub fn sync_failure_message(count: usize) -> String {
    format!(
        "{} offline {} failed to sync. Will retry later.",
        count,
        items(count)
    )
}
