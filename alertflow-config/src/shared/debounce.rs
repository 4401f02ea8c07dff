use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Debouncing configuration for the change-notification path.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DebounceConfig {
    /// Minimum time, in milliseconds, between the end of one recompute
    /// fan-out and the start of the next.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Capacity of the relay channel between the notification listener and
    /// the debouncer.
    #[serde(default = "default_relay_capacity")]
    pub relay_capacity: usize,
    /// Maximum number of per-key fetches running concurrently during a
    /// fan-out cycle.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

impl DebounceConfig {
    /// Default debounce interval in milliseconds.
    pub const DEFAULT_INTERVAL_MS: u64 = 100;

    /// Default relay channel capacity.
    pub const DEFAULT_RELAY_CAPACITY: usize = 16_384;

    /// Default fan-out concurrency limit.
    pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 256;

    /// Validates debounce configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.relay_capacity == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "debounce.relay_capacity",
                constraint: "must be greater than 0",
            });
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "debounce.max_concurrent_fetches",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            relay_capacity: default_relay_capacity(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

fn default_interval_ms() -> u64 {
    DebounceConfig::DEFAULT_INTERVAL_MS
}

fn default_relay_capacity() -> usize {
    DebounceConfig::DEFAULT_RELAY_CAPACITY
}

fn default_max_concurrent_fetches() -> usize {
    DebounceConfig::DEFAULT_MAX_CONCURRENT_FETCHES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(DebounceConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_fetch_concurrency_is_rejected() {
        let config = DebounceConfig {
            max_concurrent_fetches: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
