//! Storage collaborators.
//!
//! The monitor queries storage through [`StorageView`] and mutates it through
//! [`StorageHandler`]. [`MemoryStorage`] is the bundled in-memory handler.

mod memory;
mod traits;

pub use memory::MemoryStorage;
pub use traits::{EmptyView, StorageError, StorageHandler, StorageView};

pub(crate) use traits::HandlerView;
