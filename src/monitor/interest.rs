//! Interest index: which watchers care about which resource.
//!
//! Fan-out for one key is bracketed by [`InterestIndex::begin_transaction`]
//! and [`InterestIndex::end_transaction`]. While any bracket is open,
//! registration changes are queued and applied when the outermost bracket
//! closes, so watchers may (un)register from inside their own callback.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};
use uuid::Uuid;

use crate::channel::StorageChannel;
use crate::source::ActionSource;
use crate::stack::{ResourceKey, ResourceStack};
use crate::storage::StorageView;

/// Unique identifier for a watcher registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatcherId(Uuid);

impl WatcherId {
    /// Create a new random watcher id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives per-resource change deltas.
pub trait StackWatcher: Send + Sync {
    /// `current` is the stored total as reported by `view` at notification
    /// time; `delta` is the signed change that was posted.
    fn on_stack_change(
        &self,
        view: &dyn StorageView,
        current: &ResourceStack,
        delta: &ResourceStack,
        source: &ActionSource,
        channel: StorageChannel,
    );
}

type WatcherSlot = (WatcherId, Arc<dyn StackWatcher>);

enum PendingOp {
    Watch {
        key: ResourceKey,
        id: WatcherId,
        watcher: Arc<dyn StackWatcher>,
    },
    Unwatch {
        key: ResourceKey,
        id: WatcherId,
    },
    UnwatchAll {
        id: WatcherId,
    },
}

#[derive(Default)]
struct InterestState {
    by_key: HashMap<ResourceKey, Vec<WatcherSlot>>,
    depth: usize,
    pending: Vec<PendingOp>,
    begun: u64,
}

impl InterestState {
    fn insert(&mut self, key: ResourceKey, id: WatcherId, watcher: Arc<dyn StackWatcher>) {
        self.by_key.entry(key).or_default().push((id, watcher));
    }

    fn remove(&mut self, key: &ResourceKey, id: WatcherId) -> bool {
        let Some(slots) = self.by_key.get_mut(key) else {
            return false;
        };
        let before = slots.len();
        slots.retain(|(existing, _)| *existing != id);
        let removed = slots.len() != before;
        if slots.is_empty() {
            self.by_key.remove(key);
        }
        removed
    }

    fn remove_all(&mut self, id: WatcherId) -> usize {
        let mut removed = 0;
        self.by_key.retain(|_, slots| {
            let before = slots.len();
            slots.retain(|(existing, _)| *existing != id);
            removed += before - slots.len();
            !slots.is_empty()
        });
        removed
    }

    fn contains(&self, key: &ResourceKey, id: WatcherId) -> bool {
        self.by_key
            .get(key)
            .is_some_and(|slots| slots.iter().any(|(existing, _)| *existing == id))
    }

    fn apply(&mut self, op: PendingOp) {
        match op {
            PendingOp::Watch { key, id, watcher } => self.insert(key, id, watcher),
            PendingOp::Unwatch { key, id } => {
                self.remove(&key, id);
            }
            PendingOp::UnwatchAll { id } => {
                self.remove_all(id);
            }
        }
    }
}

/// Maps resource keys to the watchers interested in them.
#[derive(Default)]
pub struct InterestIndex {
    state: Mutex<InterestState>,
}

impl fmt::Debug for InterestIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("InterestIndex")
            .field("keys", &state.by_key.len())
            .field("depth", &state.depth)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl InterestIndex {
    /// Create an index with no watchers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InterestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `watcher` for `key`.
    ///
    /// Inside a transaction the registration takes effect when the outermost
    /// transaction ends.
    pub fn watch(&self, key: ResourceKey, watcher: Arc<dyn StackWatcher>) -> WatcherId {
        let id = WatcherId::new();
        let mut state = self.lock();
        if state.depth > 0 {
            state.pending.push(PendingOp::Watch { key, id, watcher });
        } else {
            state.insert(key, id, watcher);
        }
        id
    }

    /// Remove one registration.
    ///
    /// Returns whether the registration exists (or is queued) at call time.
    pub fn unwatch(&self, key: &ResourceKey, id: WatcherId) -> bool {
        let mut state = self.lock();
        if state.depth == 0 {
            return state.remove(key, id);
        }

        let known = state.contains(key, id)
            || state.pending.iter().any(|op| {
                matches!(op, PendingOp::Watch { key: k, id: i, .. } if k == key && *i == id)
            });
        state.pending.push(PendingOp::Unwatch { key: key.clone(), id });
        known
    }

    /// Remove `id` from every key. Returns how many registrations it held.
    pub fn unwatch_all(&self, id: WatcherId) -> usize {
        let mut state = self.lock();
        if state.depth == 0 {
            return state.remove_all(id);
        }

        let held = state
            .by_key
            .values()
            .flatten()
            .filter(|(existing, _)| *existing == id)
            .count();
        state.pending.push(PendingOp::UnwatchAll { id });
        held
    }

    /// Snapshot of the watchers for `key`; empty when nobody is interested.
    #[must_use]
    pub fn interested_watchers(&self, key: &ResourceKey) -> Vec<Arc<dyn StackWatcher>> {
        self.lock()
            .by_key
            .get(key)
            .map(|slots| slots.iter().map(|(_, w)| Arc::clone(w)).collect())
            .unwrap_or_default()
    }

    /// Open a notification bracket. Brackets nest.
    pub fn begin_transaction(&self) {
        let mut state = self.lock();
        if state.depth == 0 {
            state.begun += 1;
        }
        state.depth += 1;
    }

    /// Open a bracket that closes when the returned value is dropped,
    /// including when a watcher panics inside it.
    pub fn transaction(&self) -> InterestTransaction<'_> {
        self.begin_transaction();
        InterestTransaction { index: self }
    }

    /// Close a bracket; the outermost close applies queued registrations.
    pub fn end_transaction(&self) {
        let mut state = self.lock();
        if state.depth == 0 {
            warn!("interest transaction ended without a matching begin");
            return;
        }
        state.depth -= 1;
        if state.depth > 0 {
            return;
        }

        let pending = std::mem::take(&mut state.pending);
        if !pending.is_empty() {
            trace!(ops = pending.len(), "applying deferred interest changes");
        }
        for op in pending {
            state.apply(op);
        }
    }

    /// True while any bracket is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.lock().depth > 0
    }

    /// How many outermost transactions have been opened so far.
    #[must_use]
    pub fn transactions_begun(&self) -> u64 {
        self.lock().begun
    }

    /// Number of watchers registered for `key`.
    #[must_use]
    pub fn watcher_count(&self, key: &ResourceKey) -> usize {
        self.lock().by_key.get(key).map_or(0, Vec::len)
    }

    /// Number of keys with at least one watcher.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().by_key.len()
    }

    /// True when no key has a watcher.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An open bracket on an [`InterestIndex`]; ends the transaction on drop.
#[derive(Debug)]
#[must_use = "dropping the bracket ends the transaction immediately"]
pub struct InterestTransaction<'a> {
    index: &'a InterestIndex,
}

impl Drop for InterestTransaction<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!("closing interest transaction during unwind");
        }
        self.index.end_transaction();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl StackWatcher for Noop {
        fn on_stack_change(
            &self,
            _view: &dyn StorageView,
            _current: &ResourceStack,
            _delta: &ResourceStack,
            _source: &ActionSource,
            _channel: StorageChannel,
        ) {
        }
    }

    fn key() -> ResourceKey {
        ResourceKey::item("redstone")
    }

    #[test]
    fn unknown_key_has_empty_interest() {
        let index = InterestIndex::new();
        assert!(index.interested_watchers(&key()).is_empty());
        assert_eq!(index.watcher_count(&key()), 0);
    }

    #[test]
    fn last_unwatch_drops_the_entry() {
        let index = InterestIndex::new();
        let a = index.watch(key(), Arc::new(Noop));
        let b = index.watch(key(), Arc::new(Noop));
        assert_eq!(index.watcher_count(&key()), 2);
        assert_eq!(index.len(), 1);

        assert!(index.unwatch(&key(), a));
        assert!(!index.unwatch(&key(), a));
        assert_eq!(index.len(), 1);

        assert!(index.unwatch(&key(), b));
        assert!(index.is_empty());
    }

    #[test]
    fn unwatch_all_spans_keys() {
        let index = InterestIndex::new();
        let id = index.watch(key(), Arc::new(Noop));
        let other = ResourceKey::item("glowstone");
        index.watch(other.clone(), Arc::new(Noop));

        // Same id registered for a second key is a separate slot.
        index.lock().insert(other.clone(), id, Arc::new(Noop));

        assert_eq!(index.unwatch_all(id), 2);
        assert_eq!(index.watcher_count(&key()), 0);
        assert_eq!(index.watcher_count(&other), 1);
    }

    #[test]
    fn registrations_inside_a_transaction_are_deferred() {
        let index = InterestIndex::new();
        let existing = index.watch(key(), Arc::new(Noop));

        index.begin_transaction();
        let added = index.watch(key(), Arc::new(Noop));
        assert!(index.unwatch(&key(), existing));
        assert_eq!(index.watcher_count(&key()), 1);

        index.begin_transaction();
        index.end_transaction();
        assert!(index.in_transaction());
        assert_eq!(index.watcher_count(&key()), 1);

        index.end_transaction();
        assert!(!index.in_transaction());
        assert_eq!(index.watcher_count(&key()), 1);
        assert!(index.unwatch(&key(), added));
        assert!(index.is_empty());
    }

    #[test]
    fn only_outermost_brackets_are_counted() {
        let index = InterestIndex::new();
        index.begin_transaction();
        index.begin_transaction();
        index.end_transaction();
        index.end_transaction();
        index.begin_transaction();
        index.end_transaction();
        assert_eq!(index.transactions_begun(), 2);
    }

    #[test]
    fn scoped_transaction_closes_on_panic() {
        let index = InterestIndex::new();
        let existing = index.watch(key(), Arc::new(Noop));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _bracket = index.transaction();
            index.unwatch(&key(), existing);
            panic!("watcher failed");
        }));

        assert!(result.is_err());
        assert!(!index.in_transaction());
        assert_eq!(index.watcher_count(&key()), 0);
        index.watch(key(), Arc::new(Noop));
        assert_eq!(index.watcher_count(&key()), 1);
    }

    #[test]
    fn unbalanced_end_is_ignored() {
        let index = InterestIndex::new();
        index.end_transaction();
        assert!(!index.in_transaction());
        index.watch(key(), Arc::new(Noop));
        assert_eq!(index.watcher_count(&key()), 1);
    }
}
