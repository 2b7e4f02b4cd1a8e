//! Abstract storage traits.
//!
//! These traits define the contract that storage handlers must implement.
//! The monitor only ever talks to storage through them, so handlers can be
//! in-memory tables, aggregated drive arrays, or adapters over a host engine.

use thiserror::Error;

use crate::channel::StorageChannel;
use crate::stack::{Actionable, ResourceKey, ResourceStack};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A stack was offered to a handler of a different channel.
    #[error("Channel mismatch: handler serves {expected}, got {found}")]
    ChannelMismatch {
        /// Channel the handler serves.
        expected: StorageChannel,
        /// Channel of the offered stack.
        found: StorageChannel,
    },

    /// Inject and extract requests must carry a positive magnitude, and stored
    /// totals must stay within `i64`.
    #[error("Invalid quantity {0}: storage requests must be positive")]
    InvalidQuantity(i64),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Read-only accessor over the current contents of one channel.
pub trait StorageView {
    /// Current stored total for `key`, or `None` if nothing is stored.
    ///
    /// Implementations that cannot answer (e.g. a backend is offline) report
    /// `None`; the caller treats that the same as an empty slot.
    fn find_current(&self, key: &ResourceKey) -> Option<ResourceStack>;
}

/// A per-channel storage handler.
///
/// # Safety Considerations
/// - Mutations must be atomic per call
/// - Implementations must tolerate being called from inside watcher callbacks
pub trait StorageHandler: StorageView + Send + Sync {
    /// The channel this handler serves.
    fn channel(&self) -> StorageChannel;

    /// Store `stack`. Returns the part that did not fit, if any.
    fn inject(
        &self,
        stack: ResourceStack,
        mode: Actionable,
    ) -> Result<Option<ResourceStack>, StorageError>;

    /// Remove up to `request.quantity`. Returns what was (or would be) removed.
    fn extract(
        &self,
        request: ResourceStack,
        mode: Actionable,
    ) -> Result<Option<ResourceStack>, StorageError>;

    /// Every non-empty stack currently stored.
    fn available_stacks(&self) -> Result<Vec<ResourceStack>, StorageError>;
}

/// A view with no contents, used when a channel has no handler bound.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyView;

impl StorageView for EmptyView {
    fn find_current(&self, _key: &ResourceKey) -> Option<ResourceStack> {
        None
    }
}

/// Borrows a handler as a plain view.
pub(crate) struct HandlerView<'a>(pub(crate) &'a dyn StorageHandler);

impl StorageView for HandlerView<'_> {
    fn find_current(&self, key: &ResourceKey) -> Option<ResourceStack> {
        self.0.find_current(key)
    }
}
