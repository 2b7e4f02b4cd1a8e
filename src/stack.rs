//! Resource identities, stacks and change batches.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channel::StorageChannel;

/// Identity of a stackable resource type.
///
/// The channel is part of the identity, so an item and a fluid that share a
/// name are different keys and never compare equal.
///
/// # Examples
///
/// ```
/// use gridwatch::{ResourceKey, StorageChannel};
///
/// let iron = ResourceKey::item("iron_ingot");
/// let lava = ResourceKey::fluid("lava");
/// assert_eq!(iron.channel(), StorageChannel::Items);
/// assert_ne!(ResourceKey::item("lava"), lava);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    channel: StorageChannel,
    id: String,
    #[serde(default)]
    variant: u32,
}

impl ResourceKey {
    /// Creates a key on the given channel.
    #[must_use]
    pub fn new(channel: StorageChannel, id: impl Into<String>, variant: u32) -> Self {
        Self {
            channel,
            id: id.into(),
            variant,
        }
    }

    /// Creates an item key with the default variant.
    #[must_use]
    pub fn item(id: impl Into<String>) -> Self {
        Self::new(StorageChannel::Items, id, 0)
    }

    /// Creates a fluid key with the default variant.
    #[must_use]
    pub fn fluid(id: impl Into<String>) -> Self {
        Self::new(StorageChannel::Fluids, id, 0)
    }

    /// Returns a copy of this key with a different variant.
    #[must_use]
    pub fn with_variant(mut self, variant: u32) -> Self {
        self.variant = variant;
        self
    }

    /// The channel this key lives on.
    #[must_use]
    pub const fn channel(&self) -> StorageChannel {
        self.channel
    }

    /// Registry name of the resource.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Damage value, dye colour or similar sub-type; 0 by default.
    #[must_use]
    pub const fn variant(&self) -> u32 {
        self.variant
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variant == 0 {
            write!(f, "{}:{}", self.channel, self.id)
        } else {
            write!(f, "{}:{}@{}", self.channel, self.id, self.variant)
        }
    }
}

/// A resource key paired with a signed quantity.
///
/// The same type is used for stored totals and for change deltas. As a delta the
/// sign carries the direction: removals are negative once normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceStack {
    /// Which resource.
    pub key: ResourceKey,
    /// How much of it; signed when used as a delta.
    pub quantity: i64,
}

/// A signed change for one resource identity.
pub type ResourceDelta = ResourceStack;

/// The ordered deltas produced by one caller invocation.
pub type ChangeBatch = Vec<ResourceDelta>;

impl ResourceStack {
    /// Creates a stack of `quantity` units of `key`.
    #[must_use]
    pub const fn new(key: ResourceKey, quantity: i64) -> Self {
        Self { key, quantity }
    }

    /// A zero-quantity record for `key`.
    #[must_use]
    pub fn zero(key: ResourceKey) -> Self {
        Self::new(key, 0)
    }

    /// Copy of this stack with another quantity.
    #[must_use]
    pub fn with_quantity(&self, quantity: i64) -> Self {
        Self::new(self.key.clone(), quantity)
    }

    /// Copy of this stack with the quantity sign flipped.
    ///
    /// Saturates instead of overflowing on `i64::MIN`.
    #[must_use]
    pub fn negated(&self) -> Self {
        self.with_quantity(self.quantity.saturating_neg())
    }

    /// Shorthand for `self.key.channel()`.
    #[must_use]
    pub const fn channel(&self) -> StorageChannel {
        self.key.channel()
    }

    /// True when the quantity is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.quantity == 0
    }
}

impl fmt::Display for ResourceStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.quantity, self.key)
    }
}

/// Whether a storage operation is performed or only simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actionable {
    /// Mutate the storage and report the change.
    Modulate,
    /// Compute the outcome without mutating anything.
    Simulate,
}
