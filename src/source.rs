//! Action sources.
//!
//! Every change posted to a monitor carries the actor that caused it, so
//! watchers can tell a player's extraction from an automated transfer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who (or what) caused a storage change.
///
/// # Examples
///
/// ```
/// use gridwatch::ActionSource;
///
/// let player = ActionSource::player("alex");
/// let machine = ActionSource::machine("interface-7");
/// assert!(player.is_player());
/// assert!(!machine.is_player());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSource {
    /// A player acting through a terminal.
    Player {
        /// Host identifier of the player.
        player_id: String,
    },

    /// An automated block such as an import bus or autocrafter.
    Machine {
        /// Host identifier of the machine.
        machine_id: String,

        /// Optional machine type tag.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },

    /// The grid itself, e.g. when rebalancing between storage cells.
    Network,

    /// Provenance was not recorded.
    Unknown {
        /// Free-form note, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl ActionSource {
    /// Creates a player source.
    #[must_use]
    pub fn player(player_id: impl Into<String>) -> Self {
        Self::Player {
            player_id: player_id.into(),
        }
    }

    /// Creates a machine source.
    #[must_use]
    pub fn machine(machine_id: impl Into<String>) -> Self {
        Self::Machine {
            machine_id: machine_id.into(),
            kind: None,
        }
    }

    /// Creates a machine source with a kind tag.
    #[must_use]
    pub fn machine_with_kind(machine_id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::Machine {
            machine_id: machine_id.into(),
            kind: Some(kind.into()),
        }
    }

    /// Creates an unknown source.
    #[must_use]
    pub const fn unknown() -> Self {
        Self::Unknown { description: None }
    }

    /// Returns true for [`ActionSource::Player`].
    #[must_use]
    pub const fn is_player(&self) -> bool {
        matches!(self, Self::Player { .. })
    }

    /// Returns true for [`ActionSource::Machine`].
    #[must_use]
    pub const fn is_machine(&self) -> bool {
        matches!(self, Self::Machine { .. })
    }
}

impl Default for ActionSource {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for ActionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player { player_id } => write!(f, "player:{player_id}"),
            Self::Machine { machine_id, .. } => write!(f, "machine:{machine_id}"),
            Self::Network => f.write_str("network"),
            Self::Unknown { .. } => f.write_str("unknown"),
        }
    }
}
