//! Change propagation for storage networks.
//!
//! A [`ChangeMonitor`] sits in front of one storage channel. Every batch of
//! deltas posted to it is announced to the [`ListenerRegistry`], fanned out
//! per resource through the shared [`InterestIndex`], and folded into at most
//! one [`StorageEvent`] per tick. The network-wide [`RecursionGuard`] drops
//! propagation attempts that a monitor makes while already propagating.

/// Outward events and the bus they go to.
pub mod events;
/// Network-wide recursion guard.
pub mod guard;
/// Per-resource watcher registrations.
pub mod interest;
/// Coarse listener registrations.
pub mod listeners;
/// The change monitor itself.
pub mod network;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use events::{ChannelEventBus, EventBus, StorageEvent, StorageEventStream};
pub use guard::{GuardEntry, RecursionGuard};
pub use interest::{InterestIndex, InterestTransaction, StackWatcher, WatcherId};
pub use listeners::{ListenerRegistry, ListenerToken, MonitorReceiver};
pub use network::ChangeMonitor;

/// Identity of one monitor instance, as tracked by the recursion guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorId(Uuid);

impl MonitorId {
    /// Create a new random monitor id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MonitorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
