//! Network-wide recursion guard.
//!
//! Tracks which monitors are currently inside a propagation wave. A monitor
//! that tries to propagate again while already on the stack is turned away,
//! which is what stops a watcher from feeding its own change back forever.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{error, warn};

use crate::error::{GridError, GridResult};

use super::MonitorId;

/// Stack of monitors with an active `post_change` call.
///
/// The lock is held only inside [`enter`](Self::enter) and
/// [`exit`](Self::exit); the LIFO invariant comes from call structure.
#[derive(Debug, Default)]
pub struct RecursionGuard {
    stack: Mutex<Vec<MonitorId>>,
}

impl RecursionGuard {
    /// Create an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned guard still holds a consistent Vec; pushes and pops are single calls.
    fn lock(&self) -> MutexGuard<'_, Vec<MonitorId>> {
        self.stack.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push `id` unless it is already active. Returns false when the caller
    /// must abort without side effects.
    pub fn enter(&self, id: MonitorId) -> bool {
        let mut stack = self.lock();
        if stack.contains(&id) {
            return false;
        }
        stack.push(id);
        true
    }

    /// Like [`enter`](Self::enter), but the returned entry exits `id` again
    /// when dropped, so a panicking callback cannot leave it on the stack.
    #[must_use]
    pub fn try_enter(&self, id: MonitorId) -> Option<GuardEntry<'_>> {
        self.enter(id).then_some(GuardEntry {
            guard: self,
            id,
            released: false,
        })
    }

    /// Pop the top entry, which must be `id`.
    ///
    /// On mismatch the popped entry is discarded, `id` is removed wherever it
    /// sits, and the imbalance is reported as [`GridError::ReentrancyViolation`].
    pub fn exit(&self, id: MonitorId) -> GridResult<()> {
        let found = {
            let mut stack = self.lock();
            let found = stack.pop();
            if found != Some(id) {
                stack.retain(|active| *active != id);
            }
            found
        };
        if found == Some(id) {
            return Ok(());
        }

        error!(expected = %id, found = ?found, "recursion guard popped out of order");
        Err(GridError::ReentrancyViolation { expected: id, found })
    }

    /// Number of monitors currently propagating.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.lock().len()
    }

    /// True when no monitor is propagating.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// True if `id` is inside a propagation wave right now.
    #[must_use]
    pub fn is_active(&self, id: MonitorId) -> bool {
        self.lock().contains(&id)
    }
}

/// One monitor's slot on a [`RecursionGuard`].
///
/// [`release`](Self::release) exits on the normal path and reports imbalance.
/// Dropping an unreleased entry only happens while unwinding; it still exits.
#[derive(Debug)]
#[must_use = "dropping the entry exits the guard immediately"]
pub struct GuardEntry<'a> {
    guard: &'a RecursionGuard,
    id: MonitorId,
    released: bool,
}

impl GuardEntry<'_> {
    /// Exit the guard.
    ///
    /// # Errors
    /// `GridError::ReentrancyViolation` if `id` is not on top of the stack.
    pub fn release(mut self) -> GridResult<()> {
        self.released = true;
        self.guard.exit(self.id)
    }
}

impl Drop for GuardEntry<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let balanced = self.guard.exit(self.id).is_ok();
        warn!(monitor = %self.id, balanced, "recursion guard released during unwind");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_rejects_an_active_monitor() {
        let guard = RecursionGuard::new();
        let a = MonitorId::new();

        assert!(guard.enter(a));
        assert!(!guard.enter(a));
        assert_eq!(guard.depth(), 1);

        guard.exit(a).unwrap();
        assert!(guard.is_empty());
    }

    #[test]
    fn distinct_monitors_nest() {
        let guard = RecursionGuard::new();
        let a = MonitorId::new();
        let b = MonitorId::new();

        assert!(guard.enter(a));
        assert!(guard.enter(b));
        assert!(guard.is_active(a) && guard.is_active(b));

        guard.exit(b).unwrap();
        guard.exit(a).unwrap();
        assert!(guard.is_empty());
    }

    #[test]
    fn out_of_order_exit_is_a_violation() {
        let guard = RecursionGuard::new();
        let a = MonitorId::new();
        let b = MonitorId::new();

        assert!(guard.enter(a));
        assert!(guard.enter(b));

        let err = guard.exit(a).unwrap_err();
        match err {
            GridError::ReentrancyViolation { expected, found } => {
                assert_eq!(expected, a);
                assert_eq!(found, Some(b));
            }
            other => panic!("expected reentrancy violation, got {other:?}"),
        }
        assert!(guard.is_empty());
    }

    #[test]
    fn exit_on_empty_stack_is_a_violation() {
        let guard = RecursionGuard::new();
        let err = guard.exit(MonitorId::new()).unwrap_err();
        assert!(err.is_reentrancy_violation());
    }

    #[test]
    fn entry_exits_on_release() {
        let guard = RecursionGuard::new();
        let a = MonitorId::new();

        let entry = guard.try_enter(a).unwrap();
        assert!(guard.try_enter(a).is_none());
        assert!(guard.is_active(a));

        entry.release().unwrap();
        assert!(guard.is_empty());
    }

    #[test]
    fn entry_exits_when_unwinding() {
        let guard = RecursionGuard::new();
        let a = MonitorId::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _entry = guard.try_enter(a).unwrap();
            panic!("callback failed");
        }));

        assert!(result.is_err());
        assert!(guard.is_empty());
        assert!(guard.enter(a));
    }

    #[test]
    fn can_reenter_after_exit() {
        let guard = RecursionGuard::new();
        let a = MonitorId::new();

        assert!(guard.enter(a));
        guard.exit(a).unwrap();
        assert!(guard.enter(a));
        guard.exit(a).unwrap();
    }
}
