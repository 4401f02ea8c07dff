use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for the built-in mock observation feed.
///
/// The feed exists for load testing and local development; production
/// deployments keep it disabled and feed the queue from real evaluators.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MockConfig {
    /// Whether the mock feed runs at all.
    #[serde(default)]
    pub enabled: bool,
    /// Time, in milliseconds, between the starts of two production cycles.
    #[serde(default = "default_cycle_ms")]
    pub cycle_ms: u64,
    /// How many subscriptions are processed concurrently within a cycle.
    #[serde(default = "default_max_concurrent_subscriptions")]
    pub max_concurrent_subscriptions: usize,
}

impl MockConfig {
    /// Default cycle period in milliseconds.
    pub const DEFAULT_CYCLE_MS: u64 = 12_000;

    /// Default per-cycle subscription concurrency.
    pub const DEFAULT_MAX_CONCURRENT_SUBSCRIPTIONS: usize = 16;

    /// Validates mock feed settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cycle_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "mock.cycle_ms",
                constraint: "must be greater than 0",
            });
        }
        if self.max_concurrent_subscriptions == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "mock.max_concurrent_subscriptions",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cycle_ms: default_cycle_ms(),
            max_concurrent_subscriptions: default_max_concurrent_subscriptions(),
        }
    }
}

fn default_cycle_ms() -> u64 {
    MockConfig::DEFAULT_CYCLE_MS
}

fn default_max_concurrent_subscriptions() -> usize {
    MockConfig::DEFAULT_MAX_CONCURRENT_SUBSCRIPTIONS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_disabled() {
        let config = MockConfig::default();
        assert!(!config.enabled);
        assert!(config.validate().is_ok());
    }
}
