use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Batching configuration for the ingestion engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Number of pending observation rows that triggers a capacity flush.
    #[serde(default = "default_batch_max_size")]
    pub max_size: usize,
    /// Maximum time, in milliseconds, a non-empty batch waits before the
    /// timer flushes and merges it.
    #[serde(default = "default_batch_max_fill_ms")]
    pub max_fill_ms: u64,
}

impl BatchConfig {
    /// Default capacity flush threshold.
    pub const DEFAULT_MAX_SIZE: usize = 50_000;

    /// Default flush timer interval in milliseconds.
    pub const DEFAULT_MAX_FILL_MS: u64 = 500;

    /// Validates batch configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "batch.max_size",
                constraint: "must be greater than 0",
            });
        }
        if self.max_fill_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "batch.max_fill_ms",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_batch_max_size(),
            max_fill_ms: default_batch_max_fill_ms(),
        }
    }
}

fn default_batch_max_size() -> usize {
    BatchConfig::DEFAULT_MAX_SIZE
}

fn default_batch_max_fill_ms() -> u64 {
    BatchConfig::DEFAULT_MAX_FILL_MS
}

/// Configuration for the observation ingress channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IngestConfig {
    /// Capacity of the bounded channel between producers and the batching
    /// engine. Producers block once this many rows are in flight, which is
    /// the pipeline's only backpressure mechanism.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl IngestConfig {
    /// Default ingress channel capacity, three capacity flushes worth of rows.
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 150_000;

    /// Validates ingestion channel settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.channel_capacity == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "ingest.channel_capacity",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    IngestConfig::DEFAULT_CHANNEL_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(BatchConfig::default().validate().is_ok());
        assert!(IngestConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_max_size_is_rejected() {
        let config = BatchConfig {
            max_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
