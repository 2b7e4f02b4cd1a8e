//! The per-channel change monitor.
//!
//! `post_change` is one propagation wave: guard entry, one listener signal for
//! the batch, per-resource watcher fan-out, guard exit. Waves also raise a
//! pending-event flag that `on_tick` turns into at most one outward event.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{trace, warn};

use crate::channel::StorageChannel;
use crate::error::GridResult;
use crate::grid::GridContext;
use crate::source::ActionSource;
use crate::stack::{Actionable, ResourceStack};
use crate::storage::{EmptyView, HandlerView, StorageHandler, StorageView};

use super::events::StorageEvent;
use super::listeners::ListenerRegistry;
use super::MonitorId;

/// Monitors one storage channel of a grid.
pub struct ChangeMonitor {
    id: MonitorId,
    channel: StorageChannel,
    grid: Arc<GridContext>,
    listeners: Arc<ListenerRegistry>,
    send_event: AtomicBool,
    list_cache: RwLock<Option<Vec<ResourceStack>>>,
}

impl fmt::Debug for ChangeMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeMonitor")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("listeners", &self.listeners)
            .field("send_event", &self.has_pending_event())
            .finish_non_exhaustive()
    }
}

impl ChangeMonitor {
    /// Create a monitor for `channel` with its own listener registry.
    #[must_use]
    pub fn new(grid: Arc<GridContext>, channel: StorageChannel) -> Self {
        Self::with_listeners(grid, channel, Arc::new(ListenerRegistry::new()))
    }

    /// Create a monitor that notifies an existing listener registry.
    #[must_use]
    pub fn with_listeners(
        grid: Arc<GridContext>,
        channel: StorageChannel,
        listeners: Arc<ListenerRegistry>,
    ) -> Self {
        Self {
            id: MonitorId::new(),
            channel,
            grid,
            listeners,
            send_event: AtomicBool::new(false),
            list_cache: RwLock::new(None),
        }
    }

    /// This monitor's identity on the recursion guard.
    #[must_use]
    pub const fn id(&self) -> MonitorId {
        self.id
    }

    /// The channel this monitor watches.
    #[must_use]
    pub const fn channel(&self) -> StorageChannel {
        self.channel
    }

    /// Receivers of the coarse per-batch signal.
    #[must_use]
    pub const fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Shared state of the network this monitor belongs to.
    #[must_use]
    pub const fn grid(&self) -> &Arc<GridContext> {
        &self.grid
    }

    /// True if a change happened since the last [`on_tick`](Self::on_tick).
    #[must_use]
    pub fn has_pending_event(&self) -> bool {
        self.send_event.load(Ordering::Acquire)
    }

    /// The storage handler currently bound to this monitor's channel.
    #[must_use]
    pub fn handler(&self) -> Option<Arc<dyn StorageHandler>> {
        self.grid.handlers().get(self.channel)
    }

    /// Propagate a batch of changes.
    ///
    /// With `add == false` every quantity is negated before watchers see it,
    /// so callers pass removal magnitudes as positive numbers. A call made
    /// while this monitor is already propagating returns `Ok(())` without
    /// doing anything.
    ///
    /// If a watcher panics, the guard entry and the interest bracket are
    /// still released while unwinding.
    ///
    /// # Errors
    /// `GridError::ReentrancyViolation` if the recursion guard was left
    /// unbalanced by a nested caller.
    pub fn post_change(
        &self,
        add: bool,
        changes: &[ResourceStack],
        source: &ActionSource,
    ) -> GridResult<()> {
        let Some(entry) = self.grid.guard().try_enter(self.id) else {
            trace!(monitor = %self.id, channel = %self.channel, "dropped re-entrant propagation");
            return Ok(());
        };

        self.send_event.store(true, Ordering::Release);
        self.invalidate_list();
        self.listeners.notify_changes(changes, source);

        let handler = self.handler();
        let handler_view = handler.as_deref().map(HandlerView);
        let view: &dyn StorageView = match &handler_view {
            Some(view) => view,
            None => &EmptyView,
        };

        let interests = self.grid.interests();
        for change in changes {
            if change.channel() != self.channel {
                warn!(
                    monitor = %self.id,
                    channel = %self.channel,
                    key = %change.key,
                    "skipping watcher fan-out for a delta on another channel"
                );
                continue;
            }

            let watchers = interests.interested_watchers(&change.key);
            if watchers.is_empty() {
                continue;
            }

            let delta = if add { change.clone() } else { change.negated() };
            let current = view
                .find_current(&change.key)
                .unwrap_or_else(|| ResourceStack::zero(change.key.clone()));

            trace!(
                key = %change.key,
                delta = delta.quantity,
                current = current.quantity,
                watchers = watchers.len(),
                "fanning out stack change"
            );

            let _bracket = interests.transaction();
            for watcher in &watchers {
                watcher.on_stack_change(view, &current, &delta, source, self.channel);
            }
        }

        entry.release()
    }

    /// Changes reported by a storage handler; always already signed.
    ///
    /// # Errors
    /// Same as [`post_change`](Self::post_change).
    pub fn post_changes_to_listeners(
        &self,
        changes: &[ResourceStack],
        source: &ActionSource,
    ) -> GridResult<()> {
        self.post_change(true, changes, source)
    }

    /// Mark the cached contents stale and signal every listener once.
    ///
    /// Watchers, the recursion guard and the pending event are left alone.
    pub fn force_update(&self) {
        self.invalidate_list();
        self.listeners.notify_all();
    }

    /// Post one coalesced event if anything changed since the last tick.
    pub fn on_tick(&self) -> bool {
        if !self.send_event.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.grid
            .events()
            .post_event(StorageEvent::new(self.id, self.channel));
        true
    }

    /// Store `stack` through the bound handler. Returns what did not fit.
    ///
    /// The handler is mutated before watchers run, so they observe the new total.
    ///
    /// # Errors
    /// Handler failures as `GridError::Storage`, and propagation errors.
    pub fn inject(
        &self,
        stack: ResourceStack,
        mode: Actionable,
        source: &ActionSource,
    ) -> GridResult<Option<ResourceStack>> {
        let Some(handler) = self.handler() else {
            return Ok(Some(stack));
        };

        let leftover = handler.inject(stack.clone(), mode)?;
        if mode == Actionable::Modulate {
            let stored = stack.quantity - leftover.as_ref().map_or(0, |l| l.quantity);
            if stored > 0 {
                self.post_change(true, &[stack.with_quantity(stored)], source)?;
            }
        }
        Ok(leftover)
    }

    /// Remove up to `request.quantity` through the bound handler.
    ///
    /// # Errors
    /// Handler failures as `GridError::Storage`, and propagation errors.
    pub fn extract(
        &self,
        request: ResourceStack,
        mode: Actionable,
        source: &ActionSource,
    ) -> GridResult<Option<ResourceStack>> {
        let Some(handler) = self.handler() else {
            return Ok(None);
        };

        let taken = handler.extract(request, mode)?;
        if mode == Actionable::Modulate {
            if let Some(taken) = taken.as_ref().filter(|t| t.quantity > 0) {
                self.post_change(false, std::slice::from_ref(taken), source)?;
            }
        }
        Ok(taken)
    }

    /// Current contents, served from cache until the next change or forced update.
    ///
    /// # Errors
    /// Handler failures as `GridError::Storage`.
    pub fn available_stacks(&self) -> GridResult<Vec<ResourceStack>> {
        if let Some(cached) = self
            .list_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(cached.clone());
        }

        let Some(handler) = self.handler() else {
            return Ok(Vec::new());
        };
        let stacks = handler.available_stacks()?;
        *self.list_cache.write().unwrap_or_else(PoisonError::into_inner) = Some(stacks.clone());
        Ok(stacks)
    }

    fn invalidate_list(&self) {
        *self.list_cache.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
