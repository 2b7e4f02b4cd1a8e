//! Grid configuration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::channel::StorageChannel;
use crate::error::{GridResult, ValidationError};

/// Settings for building a [`StorageGrid`](crate::StorageGrid).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Max queued outward events before the bundled bus starts dropping.
    pub event_queue_capacity: usize,
    /// Channels the grid creates a monitor for.
    pub channels: Vec<StorageChannel>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: 1024,
            channels: StorageChannel::ALL.to_vec(),
        }
    }
}

impl GridConfig {
    /// Parse and validate a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    /// `ValidationError::InvalidConfig` for malformed JSON, otherwise as
    /// [`validate`](Self::validate).
    pub fn from_json_str(json: &str) -> GridResult<Self> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("invalid grid config: {e}"),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check capacity and channel settings.
    ///
    /// # Errors
    /// `ValidationError::ZeroCapacity` for a zero queue size,
    /// `NoChannels` for an empty channel list, `DuplicateChannel` for repeats.
    pub fn validate(&self) -> GridResult<()> {
        if self.event_queue_capacity == 0 {
            return Err(ValidationError::ZeroCapacity {
                field: "event_queue_capacity".to_string(),
            }
            .into());
        }
        if self.channels.is_empty() {
            return Err(ValidationError::NoChannels.into());
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert(*channel) {
                return Err(ValidationError::DuplicateChannel {
                    channel: channel.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GridError;

    #[test]
    fn default_config_is_valid() {
        let cfg = GridConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.channels, vec![StorageChannel::Items, StorageChannel::Fluids]);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg = GridConfig::from_json_str(r#"{"channels": ["fluids"]}"#).unwrap();
        assert_eq!(cfg.channels, vec![StorageChannel::Fluids]);
        assert_eq!(cfg.event_queue_capacity, 1024);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = GridConfig::from_json_str(r#"{"event_queue_capacity": 0}"#).unwrap_err();
        assert!(matches!(
            err,
            GridError::Validation(ValidationError::ZeroCapacity { .. })
        ));
    }

    #[test]
    fn duplicate_and_empty_channels_are_rejected() {
        let err = GridConfig::from_json_str(r#"{"channels": []}"#).unwrap_err();
        assert!(matches!(err, GridError::Validation(ValidationError::NoChannels)));

        let err = GridConfig::from_json_str(r#"{"channels": ["items", "items"]}"#).unwrap_err();
        assert!(matches!(
            err,
            GridError::Validation(ValidationError::DuplicateChannel { .. })
        ));
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        let err = GridConfig::from_json_str("{not json").unwrap_err();
        assert!(err.is_validation());
    }
}
