//! Outward listener registry.
//!
//! Receivers register with an opaque token and are asked, on every
//! notification pass, whether that token is still valid. Receivers that say
//! no are dropped during the same pass; nothing polls them otherwise.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::source::ActionSource;
use crate::stack::ResourceStack;

/// Opaque validity token handed out with a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerToken(Uuid);

impl ListenerToken {
    /// Create a new random token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A consumer of coarse "the list changed" signals.
pub trait MonitorReceiver: Send + Sync {
    /// Whether the registration identified by `token` is still wanted.
    fn is_valid(&self, token: &ListenerToken) -> bool;

    /// The monitored contents changed in some way.
    fn on_list_update(&self);

    /// A batch of deltas was posted. Defaults to [`on_list_update`](Self::on_list_update).
    fn on_changes(&self, changes: &[ResourceStack], source: &ActionSource) {
        let _ = (changes, source);
        self.on_list_update();
    }
}

#[derive(Clone)]
struct ListenerEntry {
    receiver: Arc<dyn MonitorReceiver>,
    token: ListenerToken,
}

fn same_receiver(a: &Arc<dyn MonitorReceiver>, b: &Arc<dyn MonitorReceiver>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// Insertion-ordered map from receiver to validity token.
///
/// Notification passes iterate a snapshot, so receivers may register or
/// unregister from inside their own callback.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: RwLock<Vec<ListenerEntry>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `receiver`, or replace its token if already registered.
    pub fn register(&self, receiver: Arc<dyn MonitorReceiver>, token: ListenerToken) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.iter_mut().find(|e| same_receiver(&e.receiver, &receiver)) {
            entry.token = token;
        } else {
            entries.push(ListenerEntry { receiver, token });
        }
    }

    /// Remove `receiver`. Returns whether it was registered.
    pub fn unregister(&self, receiver: &Arc<dyn MonitorReceiver>) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| !same_receiver(&e.receiver, receiver));
        entries.len() != before
    }

    /// Number of registered receivers, stale ones included until the next pass.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `on_list_update` to every valid receiver. Returns how many were notified.
    pub fn notify_all(&self) -> usize {
        self.notify_with(|receiver| receiver.on_list_update())
    }

    /// Send one `on_changes` per valid receiver for this batch.
    pub fn notify_changes(&self, changes: &[ResourceStack], source: &ActionSource) -> usize {
        self.notify_with(|receiver| receiver.on_changes(changes, source))
    }

    fn notify_with(&self, mut deliver: impl FnMut(&dyn MonitorReceiver)) -> usize {
        let snapshot: Vec<ListenerEntry> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut stale = Vec::new();
        let mut notified = 0;
        for entry in snapshot {
            if entry.receiver.is_valid(&entry.token) {
                deliver(entry.receiver.as_ref());
                notified += 1;
            } else {
                stale.push(entry);
            }
        }

        if !stale.is_empty() {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            // A receiver re-registered with a fresh token mid-pass is kept.
            entries.retain(|e| {
                !stale
                    .iter()
                    .any(|s| same_receiver(&s.receiver, &e.receiver) && s.token == e.token)
            });
            debug!(
                removed = stale.len(),
                remaining = entries.len(),
                "dropped stale monitor listeners"
            );
        }

        notified
    }
}
