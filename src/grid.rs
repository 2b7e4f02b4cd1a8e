//! The storage grid: shared propagation state plus one monitor per channel.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::channel::StorageChannel;
use crate::config::GridConfig;
use crate::error::GridResult;
use crate::monitor::{
    ChangeMonitor, ChannelEventBus, EventBus, InterestIndex, RecursionGuard, StorageEventStream,
};
use crate::storage::{StorageError, StorageHandler};

type HandlerSlot = RwLock<Option<Arc<dyn StorageHandler>>>;

/// The active handler for each channel.
#[derive(Default)]
pub struct HandlerTable {
    items: HandlerSlot,
    fluids: HandlerSlot,
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("items", &self.get(StorageChannel::Items).is_some())
            .field("fluids", &self.get(StorageChannel::Fluids).is_some())
            .finish()
    }
}

impl HandlerTable {
    /// A table with no handlers bound.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    const fn slot(&self, channel: StorageChannel) -> &HandlerSlot {
        match channel {
            StorageChannel::Items => &self.items,
            StorageChannel::Fluids => &self.fluids,
        }
    }

    /// The handler bound to `channel`, if any.
    #[must_use]
    pub fn get(&self, channel: StorageChannel) -> Option<Arc<dyn StorageHandler>> {
        self.slot(channel)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bind (or with `None`, unbind) the handler for `channel`.
    ///
    /// Returns the previously bound handler.
    ///
    /// # Errors
    /// `StorageError::ChannelMismatch` if `handler` serves another channel.
    pub fn set(
        &self,
        channel: StorageChannel,
        handler: Option<Arc<dyn StorageHandler>>,
    ) -> Result<Option<Arc<dyn StorageHandler>>, StorageError> {
        if let Some(h) = &handler {
            if h.channel() != channel {
                return Err(StorageError::ChannelMismatch {
                    expected: channel,
                    found: h.channel(),
                });
            }
        }
        let mut slot = self.slot(channel).write().unwrap_or_else(PoisonError::into_inner);
        Ok(std::mem::replace(&mut *slot, handler))
    }
}

/// State shared by every monitor on one network.
pub struct GridContext {
    guard: RecursionGuard,
    interests: InterestIndex,
    handlers: HandlerTable,
    events: Arc<dyn EventBus>,
}

impl fmt::Debug for GridContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridContext")
            .field("guard", &self.guard)
            .field("interests", &self.interests)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl GridContext {
    /// Fresh shared state posting to `events`.
    #[must_use]
    pub fn new(events: Arc<dyn EventBus>) -> Self {
        Self {
            guard: RecursionGuard::new(),
            interests: InterestIndex::new(),
            handlers: HandlerTable::new(),
            events,
        }
    }

    /// The network-wide recursion guard.
    #[must_use]
    pub const fn guard(&self) -> &RecursionGuard {
        &self.guard
    }

    /// Watcher registrations for every channel.
    #[must_use]
    pub const fn interests(&self) -> &InterestIndex {
        &self.interests
    }

    /// Bound storage handlers.
    #[must_use]
    pub const fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Where per-tick events go.
    #[must_use]
    pub fn events(&self) -> &dyn EventBus {
        self.events.as_ref()
    }
}

/// A storage network: one [`ChangeMonitor`] per configured channel.
#[derive(Debug)]
pub struct StorageGrid {
    context: Arc<GridContext>,
    monitors: Vec<Arc<ChangeMonitor>>,
}

impl StorageGrid {
    /// Build a grid that posts its events to `events`.
    ///
    /// # Errors
    /// `GridError::Validation` if `cfg` is invalid.
    pub fn new(cfg: &GridConfig, events: Arc<dyn EventBus>) -> GridResult<Self> {
        cfg.validate()?;
        let context = Arc::new(GridContext::new(events));
        let monitors = cfg
            .channels
            .iter()
            .map(|&channel| Arc::new(ChangeMonitor::new(Arc::clone(&context), channel)))
            .collect();
        Ok(Self { context, monitors })
    }

    /// Build a grid on a fresh [`ChannelEventBus`] and return its event stream.
    ///
    /// # Errors
    /// `GridError::Validation` if `cfg` is invalid.
    pub fn with_channel_bus(cfg: &GridConfig) -> GridResult<(Self, StorageEventStream)> {
        cfg.validate()?;
        let (bus, stream) = ChannelEventBus::from_config(cfg);
        let grid = Self::new(cfg, Arc::new(bus))?;
        Ok((grid, stream))
    }

    /// Shared state of this grid.
    #[must_use]
    pub const fn context(&self) -> &Arc<GridContext> {
        &self.context
    }

    /// Shorthand for `self.context().interests()`.
    #[must_use]
    pub fn interests(&self) -> &InterestIndex {
        self.context.interests()
    }

    /// The monitor for `channel`, if the grid was configured with it.
    #[must_use]
    pub fn monitor(&self, channel: StorageChannel) -> Option<Arc<ChangeMonitor>> {
        self.monitors.iter().find(|m| m.channel() == channel).cloned()
    }

    /// Every monitor, in configured channel order.
    #[must_use]
    pub fn monitors(&self) -> &[Arc<ChangeMonitor>] {
        &self.monitors
    }

    /// Swap the handler for `channel` and refresh that channel's listeners.
    ///
    /// # Errors
    /// `GridError::Storage` if `handler` serves another channel.
    pub fn set_handler(
        &self,
        channel: StorageChannel,
        handler: Option<Arc<dyn StorageHandler>>,
    ) -> GridResult<()> {
        let bound = handler.is_some();
        self.context.handlers().set(channel, handler)?;
        debug!(%channel, bound, "storage handler swapped");
        if let Some(monitor) = self.monitor(channel) {
            monitor.force_update();
        }
        Ok(())
    }

    /// Run the per-tick drain on every monitor. Returns how many events were posted.
    pub fn on_tick(&self) -> usize {
        self.monitors.iter().filter(|m| m.on_tick()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn handler_table_dispatches_by_channel() {
        let table = HandlerTable::new();
        assert!(table.get(StorageChannel::Items).is_none());

        table
            .set(StorageChannel::Fluids, Some(Arc::new(MemoryStorage::new(StorageChannel::Fluids))))
            .unwrap();
        assert!(table.get(StorageChannel::Items).is_none());
        assert_eq!(
            table.get(StorageChannel::Fluids).unwrap().channel(),
            StorageChannel::Fluids
        );
    }

    #[test]
    fn handler_table_rejects_foreign_channel() {
        let table = HandlerTable::new();
        let err = table
            .set(StorageChannel::Items, Some(Arc::new(MemoryStorage::new(StorageChannel::Fluids))))
            .err().unwrap();
        assert!(matches!(err, StorageError::ChannelMismatch { .. }));
    }

    #[test]
    fn handler_table_returns_previous_binding() {
        let table = HandlerTable::new();
        let first: Arc<dyn StorageHandler> = Arc::new(MemoryStorage::new(StorageChannel::Items));
        table.set(StorageChannel::Items, Some(Arc::clone(&first))).unwrap();

        let previous = table.set(StorageChannel::Items, None).unwrap().unwrap();
        assert!(Arc::ptr_eq(&previous, &first));
        assert!(table.get(StorageChannel::Items).is_none());
    }

    #[test]
    fn grid_builds_one_monitor_per_channel() {
        let (grid, _stream) = StorageGrid::with_channel_bus(&GridConfig::default()).unwrap();
        assert_eq!(grid.monitors().len(), 2);
        assert!(grid.monitor(StorageChannel::Items).is_some());
        assert_ne!(
            grid.monitor(StorageChannel::Items).unwrap().id(),
            grid.monitor(StorageChannel::Fluids).unwrap().id()
        );
    }

    #[test]
    fn unconfigured_channel_has_no_monitor() {
        let cfg = GridConfig {
            channels: vec![StorageChannel::Items],
            ..GridConfig::default()
        };
        let (grid, _stream) = StorageGrid::with_channel_bus(&cfg).unwrap();
        assert!(grid.monitor(StorageChannel::Fluids).is_none());
    }

    #[test]
    fn set_handler_forces_an_update_but_no_event() {
        let (grid, stream) = StorageGrid::with_channel_bus(&GridConfig::default()).unwrap();
        grid.set_handler(
            StorageChannel::Items,
            Some(Arc::new(MemoryStorage::new(StorageChannel::Items))),
        )
        .unwrap();

        assert_eq!(grid.on_tick(), 0);
        assert!(stream.try_recv().is_none());
    }
}
