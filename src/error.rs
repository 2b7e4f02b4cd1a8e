//! Error types for gridwatch.
//!
//! All errors are strongly typed using thiserror so callers can
//! pattern match on the exact failure instead of parsing messages.

use thiserror::Error;

use crate::monitor::MonitorId;
use crate::storage::StorageError;

/// Validation errors raised while checking configuration input.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A size or capacity field was zero.
    #[error("Field '{field}' must be greater than zero")]
    ZeroCapacity {
        /// Name of the offending field.
        field: String,
    },

    /// The channel list was empty.
    #[error("At least one storage channel must be configured")]
    NoChannels,

    /// The same channel appears twice in the channel list.
    #[error("Storage channel '{channel}' is configured more than once")]
    DuplicateChannel {
        /// The repeated channel.
        channel: String,
    },

    /// The configuration document could not be parsed.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Parser message.
        reason: String,
    },
}

/// Top-level error type for gridwatch.
#[derive(Debug, Error)]
pub enum GridError {
    /// The recursion guard was popped by a monitor that did not push the top entry.
    ///
    /// This means a nested caller broke the enter/exit pairing. It is never
    /// recoverable: continuing would let propagation recurse without bound.
    #[error(
        "Invalid access to networked storage detected: guard expected {expected}, found {found:?}"
    )]
    ReentrancyViolation {
        /// The monitor that tried to exit.
        expected: MonitorId,
        /// What was actually on top of the stack.
        found: Option<MonitorId>,
    },

    /// A storage handler rejected or failed an operation.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration input was rejected.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl GridError {
    /// Returns true if this is a recursion guard imbalance.
    #[must_use]
    pub const fn is_reentrancy_violation(&self) -> bool {
        matches!(self, Self::ReentrancyViolation { .. })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if the enclosing operation must be aborted.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::ReentrancyViolation { .. } => true,
            Self::Storage(_) | Self::Validation(_) => false,
        }
    }
}

/// Result type alias for gridwatch operations.
pub type GridResult<T> = Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reentrancy_violation_message() {
        let expected = MonitorId::new();
        let err = GridError::ReentrancyViolation { expected, found: None };
        let msg = format!("{err}");
        assert!(msg.contains("Invalid access"));
        assert!(msg.contains(&expected.to_string()));
        assert!(err.is_reentrancy_violation());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_validation_error_zero_capacity() {
        let err = ValidationError::ZeroCapacity {
            field: "event_queue_capacity".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("event_queue_capacity"));
    }

    #[test]
    fn test_grid_error_from_validation() {
        let err: GridError = ValidationError::NoChannels.into();
        assert!(err.is_validation());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_grid_error_from_storage() {
        let err: GridError = StorageError::Backend("poisoned lock".to_string()).into();
        assert!(err.is_storage());
        assert!(!err.is_fatal());
        assert!(format!("{err}").contains("poisoned lock"));
    }
}
