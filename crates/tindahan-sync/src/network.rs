//! # Network State Monitor
//!
//! Tracks online/offline state and notifies subscribers on transitions.
//!
//! ## Transition Delivery
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  signal source (probe, platform event, test)                           │
//! │       │                                                                 │
//! │       │ set_online(true)                                                │
//! │       ▼                                                                 │
//! │  ┌──────────────┐   same state?  ──► ignored, no callback              │
//! │  │ AtomicBool   │                                                       │
//! │  │ swap(state)  │   changed?     ──► every callback(state) once        │
//! │  └──────────────┘                     │                                 │
//! │                                       ├── sync agent (drain request)   │
//! │                                       ├── status display               │
//! │                                       └── … a panic in one does not    │
//! │                                           stop the others              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info};

/// Callback invoked with the new online state.
pub type NetworkCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Identifies a registered callback for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackId(u64);

/// Online/offline state with transition callbacks.
///
/// Constructed explicitly and shared through `Arc`; tests create as many
/// independent monitors as they need.
pub struct NetworkMonitor {
    online: AtomicBool,
    next_id: AtomicU64,
    callbacks: RwLock<BTreeMap<CallbackId, NetworkCallback>>,
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("online", &self.is_online())
            .field("callbacks", &self.callback_count())
            .finish()
    }
}

impl NetworkMonitor {
    pub fn new(initially_online: bool) -> Self {
        NetworkMonitor {
            online: AtomicBool::new(initially_online),
            next_id: AtomicU64::new(1),
            callbacks: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Registers a callback. It is not invoked until the next transition.
    pub fn add_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut callbacks = self.callbacks.write().unwrap_or_else(|p| p.into_inner());
        callbacks.insert(id, Arc::new(callback));
        id
    }

    /// Unregisters a callback. Returns false if it was not registered.
    pub fn remove_callback(&self, id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.write().unwrap_or_else(|p| p.into_inner());
        callbacks.remove(&id).is_some()
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Feeds an observed connectivity state.
    ///
    /// Returns true when the state changed; callbacks run only then, in
    /// registration order, on the caller's thread.
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return false;
        }

        info!(online, "Network state changed");

        // Snapshot so callbacks may (un)register without deadlocking.
        let callbacks: Vec<(CallbackId, NetworkCallback)> = self
            .callbacks
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();

        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(online))).is_err() {
                error!(callback = id.0, "Network callback panicked");
            } else {
                debug!(callback = id.0, online, "Network callback invoked");
            }
        }

        true
    }
}

impl Default for NetworkMonitor {
    /// Starts offline until a signal says otherwise.
    fn default() -> Self {
        Self::new(false)
    }
}
