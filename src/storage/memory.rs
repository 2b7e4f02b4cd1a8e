//! In-memory storage handler.
//!
//! Thread-safe, single-channel table of stored totals. It is intended for
//! embedded usage, tests, and as a reference implementation of the traits.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::channel::StorageChannel;
use crate::stack::{Actionable, ResourceKey, ResourceStack};
use crate::storage::traits::{StorageError, StorageHandler, StorageView};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct MemoryState {
    totals: BTreeMap<ResourceKey, i64>,
    stored: i64,
}

/// In-memory [`StorageHandler`] for a single channel.
///
/// An optional capacity bounds the sum of all stored quantities; injections
/// beyond it are returned as leftover. Without a capacity the sum is still
/// bounded by `i64::MAX`.
#[derive(Debug)]
pub struct MemoryStorage {
    channel: StorageChannel,
    capacity: Option<i64>,
    state: RwLock<MemoryState>,
}

impl MemoryStorage {
    /// Unbounded storage for `channel`.
    #[must_use]
    pub fn new(channel: StorageChannel) -> Self {
        Self {
            channel,
            capacity: None,
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Storage for `channel` holding at most `capacity` units in total.
    #[must_use]
    pub fn with_capacity(channel: StorageChannel, capacity: i64) -> Self {
        Self {
            capacity: Some(capacity.max(0)),
            ..Self::new(channel)
        }
    }

    /// Overwrite the stored total for `key`, bypassing capacity.
    ///
    /// Meant for seeding; no monitor is told about it.
    ///
    /// # Errors
    /// `StorageError::InvalidQuantity` if the new sum of all totals would
    /// overflow.
    pub fn set_quantity(&self, key: ResourceKey, quantity: i64) -> Result<(), StorageError> {
        self.check_channel(key.channel())?;
        let mut state = self.state.write().map_err(|_| lock_err("memory.set_quantity"))?;
        let previous = state.totals.get(&key).copied().unwrap_or(0);
        let stored = (state.stored - previous)
            .checked_add(quantity.max(0))
            .ok_or(StorageError::InvalidQuantity(quantity))?;

        if quantity > 0 {
            state.totals.insert(key, quantity);
        } else {
            state.totals.remove(&key);
        }
        state.stored = stored;
        Ok(())
    }

    /// Sum of all stored quantities.
    pub fn stored(&self) -> Result<i64, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("memory.stored"))?;
        Ok(state.stored)
    }

    fn check_channel(&self, found: StorageChannel) -> Result<(), StorageError> {
        if found == self.channel {
            Ok(())
        } else {
            Err(StorageError::ChannelMismatch {
                expected: self.channel,
                found,
            })
        }
    }

    fn check_request(&self, stack: &ResourceStack) -> Result<(), StorageError> {
        self.check_channel(stack.channel())?;
        if stack.quantity <= 0 {
            return Err(StorageError::InvalidQuantity(stack.quantity));
        }
        Ok(())
    }
}

impl StorageView for MemoryStorage {
    fn find_current(&self, key: &ResourceKey) -> Option<ResourceStack> {
        // Reads stay answerable after a panicking writer; totals are updated in one step.
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .totals
            .get(key)
            .map(|&quantity| ResourceStack::new(key.clone(), quantity))
    }
}

impl StorageHandler for MemoryStorage {
    fn channel(&self) -> StorageChannel {
        self.channel
    }

    fn inject(
        &self,
        stack: ResourceStack,
        mode: Actionable,
    ) -> Result<Option<ResourceStack>, StorageError> {
        self.check_request(&stack)?;
        let mut state = self.state.write().map_err(|_| lock_err("memory.inject"))?;

        // Totals are non-negative and sum to `stored`, so fitting under
        // `headroom` keeps every per-key total in range too.
        let headroom = i64::MAX - state.stored;
        let limit = self.capacity.map_or(headroom, |cap| (cap - state.stored).min(headroom));
        let room = limit.clamp(0, stack.quantity);
        let leftover = stack.quantity - room;

        if mode == Actionable::Modulate && room > 0 {
            let total = state.totals.get(&stack.key).copied().unwrap_or(0);
            let total = total
                .checked_add(room)
                .ok_or(StorageError::InvalidQuantity(stack.quantity))?;
            state.totals.insert(stack.key.clone(), total);
            state.stored += room;
        }

        Ok((leftover > 0).then(|| stack.with_quantity(leftover)))
    }

    fn extract(
        &self,
        request: ResourceStack,
        mode: Actionable,
    ) -> Result<Option<ResourceStack>, StorageError> {
        self.check_request(&request)?;
        let mut state = self.state.write().map_err(|_| lock_err("memory.extract"))?;

        let held = state.totals.get(&request.key).copied().unwrap_or(0);
        let taken = held.min(request.quantity);
        if taken == 0 {
            return Ok(None);
        }

        if mode == Actionable::Modulate {
            if taken == held {
                state.totals.remove(&request.key);
            } else if let Some(total) = state.totals.get_mut(&request.key) {
                *total -= taken;
            }
            state.stored -= taken;
        }

        Ok(Some(request.with_quantity(taken)))
    }

    fn available_stacks(&self) -> Result<Vec<ResourceStack>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("memory.available_stacks"))?;
        Ok(state
            .totals
            .iter()
            .map(|(key, &quantity)| ResourceStack::new(key.clone(), quantity))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iron() -> ResourceKey {
        ResourceKey::item("iron_ingot")
    }

    #[test]
    fn inject_extract_and_find_current() {
        let store = MemoryStorage::new(StorageChannel::Items);

        let leftover = store
            .inject(ResourceStack::new(iron(), 10), Actionable::Modulate)
            .unwrap();
        assert!(leftover.is_none());
        assert_eq!(store.find_current(&iron()).unwrap().quantity, 10);

        let taken = store
            .extract(ResourceStack::new(iron(), 4), Actionable::Modulate)
            .unwrap()
            .unwrap();
        assert_eq!(taken.quantity, 4);
        assert_eq!(store.find_current(&iron()).unwrap().quantity, 6);
        assert_eq!(store.stored().unwrap(), 6);
    }

    #[test]
    fn extract_everything_removes_the_slot() {
        let store = MemoryStorage::new(StorageChannel::Items);
        store.set_quantity(iron(), 3).unwrap();

        let taken = store
            .extract(ResourceStack::new(iron(), 99), Actionable::Modulate)
            .unwrap()
            .unwrap();
        assert_eq!(taken.quantity, 3);
        assert!(store.find_current(&iron()).is_none());
        assert!(store.available_stacks().unwrap().is_empty());
    }

    #[test]
    fn simulate_does_not_mutate() {
        let store = MemoryStorage::new(StorageChannel::Items);
        store.set_quantity(iron(), 5).unwrap();

        store
            .inject(ResourceStack::new(iron(), 5), Actionable::Simulate)
            .unwrap();
        let taken = store
            .extract(ResourceStack::new(iron(), 2), Actionable::Simulate)
            .unwrap()
            .unwrap();

        assert_eq!(taken.quantity, 2);
        assert_eq!(store.find_current(&iron()).unwrap().quantity, 5);
    }

    #[test]
    fn capacity_returns_leftover() {
        let store = MemoryStorage::with_capacity(StorageChannel::Fluids, 1000);
        let water = ResourceKey::fluid("water");

        let leftover = store
            .inject(ResourceStack::new(water.clone(), 1500), Actionable::Modulate)
            .unwrap()
            .unwrap();
        assert_eq!(leftover.quantity, 500);
        assert_eq!(store.find_current(&water).unwrap().quantity, 1000);

        let full = store
            .inject(ResourceStack::new(water, 1), Actionable::Modulate)
            .unwrap()
            .unwrap();
        assert_eq!(full.quantity, 1);
    }

    #[test]
    fn unbounded_storage_saturates_instead_of_overflowing() {
        let store = MemoryStorage::new(StorageChannel::Items);
        let a = ResourceKey::item("a");
        let b = ResourceKey::item("b");

        let leftover = store
            .inject(ResourceStack::new(a.clone(), i64::MAX), Actionable::Modulate)
            .unwrap();
        assert!(leftover.is_none());

        let leftover = store
            .inject(ResourceStack::new(b.clone(), 1), Actionable::Modulate)
            .unwrap()
            .unwrap();
        assert_eq!(leftover.quantity, 1);

        let leftover = store
            .inject(ResourceStack::new(a.clone(), 5), Actionable::Modulate)
            .unwrap()
            .unwrap();
        assert_eq!(leftover.quantity, 5);

        assert_eq!(store.find_current(&a).unwrap().quantity, i64::MAX);
        assert!(store.find_current(&b).is_none());
        assert_eq!(store.stored().unwrap(), i64::MAX);
    }

    #[test]
    fn seeding_past_the_total_limit_is_rejected() {
        let store = MemoryStorage::new(StorageChannel::Items);
        store.set_quantity(ResourceKey::item("a"), i64::MAX).unwrap();

        let err = store.set_quantity(ResourceKey::item("b"), 1).unwrap_err();
        assert!(matches!(err, StorageError::InvalidQuantity(1)));
        assert!(store.find_current(&ResourceKey::item("b")).is_none());

        // Replacing the same key is fine.
        store.set_quantity(ResourceKey::item("a"), 3).unwrap();
        assert_eq!(store.stored().unwrap(), 3);
    }

    #[test]
    fn rejects_wrong_channel_and_non_positive_requests() {
        let store = MemoryStorage::new(StorageChannel::Items);

        let err = store
            .inject(ResourceStack::new(ResourceKey::fluid("lava"), 1), Actionable::Modulate)
            .unwrap_err();
        assert!(matches!(err, StorageError::ChannelMismatch { .. }));

        let err = store
            .extract(ResourceStack::new(iron(), 0), Actionable::Modulate)
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidQuantity(0)));
    }

    #[test]
    fn available_stacks_are_ordered_by_key() {
        let store = MemoryStorage::new(StorageChannel::Items);
        store.set_quantity(ResourceKey::item("b"), 2).unwrap();
        store.set_quantity(ResourceKey::item("a"), 1).unwrap();

        let ids: Vec<_> = store
            .available_stacks()
            .unwrap()
            .into_iter()
            .map(|s| s.key.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
