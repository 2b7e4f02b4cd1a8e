//! # gridwatch - change propagation for storage networks
//!
//! gridwatch watches additions and removals of stackable resources (items and
//! fluids) on a storage network and tells everyone who cares, exactly once.
//!
//! ## Core Concepts
//!
//! - **ChangeMonitor**: one per storage channel; turns posted deltas into
//!   listener signals, per-resource watcher callbacks, and per-tick events
//! - **InterestIndex**: which watchers care about which resource
//! - **ListenerRegistry**: coarse "list changed" receivers with lazy cleanup
//! - **RecursionGuard**: drops propagation a monitor starts while already
//!   propagating, so watchers cannot feed their own changes back forever
//! - **StorageGrid**: the shared state plus one monitor per configured channel
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gridwatch::{
//!     ActionSource, Actionable, GridConfig, MemoryStorage, ResourceKey, ResourceStack,
//!     StorageChannel, StorageGrid,
//! };
//!
//! let (grid, events) = StorageGrid::with_channel_bus(&GridConfig::default())?;
//! let store = Arc::new(MemoryStorage::new(StorageChannel::Items));
//! grid.set_handler(StorageChannel::Items, Some(store))?;
//!
//! let items = grid.monitor(StorageChannel::Items).unwrap();
//! items.inject(
//!     ResourceStack::new(ResourceKey::item("iron_ingot"), 64),
//!     Actionable::Modulate,
//!     &ActionSource::player("alex"),
//! )?;
//!
//! grid.on_tick();
//! assert!(events.try_recv().is_some());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod config;
pub mod error;
pub mod grid;
pub mod monitor;
pub mod source;
pub mod stack;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use channel::StorageChannel;
pub use config::GridConfig;
pub use error::{GridError, GridResult, ValidationError};
pub use grid::{GridContext, HandlerTable, StorageGrid};
pub use monitor::{
    ChangeMonitor, ChannelEventBus, EventBus, GuardEntry, InterestIndex, InterestTransaction,
    ListenerRegistry, ListenerToken, MonitorId, MonitorReceiver, RecursionGuard, StackWatcher,
    StorageEvent, StorageEventStream, WatcherId,
};
pub use source::ActionSource;
pub use stack::{Actionable, ChangeBatch, ResourceDelta, ResourceKey, ResourceStack};
pub use storage::{EmptyView, MemoryStorage, StorageError, StorageHandler, StorageView};
