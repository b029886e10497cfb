//! # Notification Emitter
//!
//! Delivers user-facing messages into the notification feed rendered by
//! the UI. Delivery problems are logged and swallowed: a notification
//! never turns a successful sync into a failed one.
//!
//! ```text
//! SyncManager ──notify(msg, kind, scope)──► Notifier ──publish──► NotificationFeed
//!                                              │                     ├── InMemoryFeed
//!                                              └── Err? warn!, drop  └── HttpNotificationFeed
//! ```

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::remote::ApiClient;
use tindahan_core::{Notification, NotificationKind};

/// Append-only sink of notifications.
#[async_trait]
pub trait NotificationFeed: Send + Sync {
    async fn publish(&self, notification: &Notification) -> SyncResult<()>;
}

// =============================================================================
// Notifier
// =============================================================================

/// Infallible front of a [`NotificationFeed`].
#[derive(Clone)]
pub struct Notifier {
    feed: Arc<dyn NotificationFeed>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

impl Notifier {
    pub fn new(feed: Arc<dyn NotificationFeed>) -> Self {
        Notifier { feed }
    }

    /// Publishes a notification. Never fails.
    pub async fn notify(
        &self,
        message: impl Into<String>,
        kind: NotificationKind,
        scope: Option<&str>,
    ) {
        let notification = Notification::new(message, kind, scope.map(str::to_owned));
        match self.feed.publish(&notification).await {
            Ok(()) => debug!(
                kind = %notification.kind,
                message = %notification.message,
                "Notification published"
            ),
            Err(e) => warn!(
                error = %e,
                message = %notification.message,
                "Failed to publish notification"
            ),
        }
    }
}

// =============================================================================
// In-Memory Feed
// =============================================================================

/// Process-local feed: bounded history plus live subscribers.
#[derive(Debug)]
pub struct InMemoryFeed {
    capacity: usize,
    history: Mutex<VecDeque<Notification>>,
    sender: broadcast::Sender<Notification>,
}

impl InMemoryFeed {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        InMemoryFeed {
            capacity,
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            sender,
        }
    }

    /// Live stream of notifications published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Retained notifications, oldest first.
    pub fn history(&self) -> Vec<Notification> {
        self.history
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.history.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryFeed {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl NotificationFeed for InMemoryFeed {
    async fn publish(&self, notification: &Notification) -> SyncResult<()> {
        {
            let mut history = self.history.lock().unwrap_or_else(|p| p.into_inner());
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(notification.clone());
        }
        // No subscribers is fine; history still has it.
        let _ = self.sender.send(notification.clone());
        Ok(())
    }
}

// =============================================================================
// HTTP Feed
// =============================================================================

/// Feed backed by the REST `notifications` collection.
#[derive(Debug, Clone)]
pub struct HttpNotificationFeed {
    client: ApiClient,
}

impl HttpNotificationFeed {
    pub fn new(client: ApiClient) -> Self {
        HttpNotificationFeed { client }
    }
}

#[async_trait]
impl NotificationFeed for HttpNotificationFeed {
    async fn publish(&self, notification: &Notification) -> SyncResult<()> {
        let body = json!({
            "message": notification.message,
            "type": notification.kind,
            "store": notification.scope,
        });
        self.client
            .request_json(Method::POST, "notifications", Some(&body))
            .await
            .map(|_| ())
            .map_err(|e| SyncError::NotificationFailure(e.to_string()))
    }
}
