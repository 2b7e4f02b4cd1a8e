//! Storage channels.
//!
//! A channel partitions the storage domain. Resource identities are only ever
//! compared within one channel.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of storage channels a grid knows about.
///
/// Adding a variant is a compile-time checked change: every dispatch over
/// channels in this crate is an exhaustive `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageChannel {
    /// Discrete item stacks.
    Items,
    /// Fluid volumes.
    Fluids,
}

impl StorageChannel {
    /// All channels in declaration order.
    pub const ALL: [Self; 2] = [Self::Items, Self::Fluids];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Items => "items",
            Self::Fluids => "fluids",
        }
    }
}

impl fmt::Display for StorageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
