use serde::Deserialize;

use crate::shared::{
    BatchConfig, DebounceConfig, IngestConfig, MockConfig, PgConnectionConfig, ValidationError,
};

/// Top-level configuration for the alertflow service.
///
/// Contains all settings required to run the ingestion and notification
/// pipeline: source database connection, batching and debouncing parameters,
/// and the names of the Postgres objects the pipeline talks to.
#[derive(Clone, Debug, Deserialize)]
pub struct ServiceConfig {
    /// Connection configuration for the Postgres instance holding the alert
    /// staging table and notification channels.
    pub source: PgConnectionConfig,
    /// Observation ingress channel configuration.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Batching configuration for the ingestion engine.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Debouncing configuration for the notification path.
    #[serde(default)]
    pub debounce: DebounceConfig,
    /// Notification channel names.
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Staging table and merge procedure names.
    #[serde(default)]
    pub staging: StagingConfig,
    /// Mock observation feed settings.
    #[serde(default)]
    pub mock: MockConfig,
}

impl ServiceConfig {
    /// Validates all nested configuration sections.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.ingest.validate()?;
        self.batch.validate()?;
        self.debounce.validate()?;
        self.mock.validate()?;

        Ok(())
    }
}

/// Names of the Postgres notification channels the pipeline listens on.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChannelsConfig {
    /// Channel carrying batched subscription-update events (`{"ids": [..]}`).
    #[serde(default = "default_subscription_updates_channel")]
    pub subscription_updates: String,
    /// Channel carrying immediate condition-change events
    /// (`{"id": .., "is_on": ..}`).
    #[serde(default = "default_condition_changes_channel")]
    pub condition_changes: String,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            subscription_updates: default_subscription_updates_channel(),
            condition_changes: default_condition_changes_channel(),
        }
    }
}

fn default_subscription_updates_channel() -> String {
    "user_subscription_alerts".to_owned()
}

fn default_condition_changes_channel() -> String {
    "subscription_condition_changes".to_owned()
}

/// Names of the staging table and merge procedure used by the bulk sink.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StagingConfig {
    /// Table receiving bulk-loaded observation rows.
    #[serde(default = "default_staging_table")]
    pub table: String,
    /// Stored procedure that merges staged rows into canonical alert state.
    #[serde(default = "default_merge_procedure")]
    pub merge_procedure: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            table: default_staging_table(),
            merge_procedure: default_merge_procedure(),
        }
    }
}

fn default_staging_table() -> String {
    "alerts_staging".to_owned()
}

fn default_merge_procedure() -> String {
    "process_alert_staging".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: ServiceConfig = serde_json::from_str(
            r#"{
                "source": {
                    "host": "localhost",
                    "port": 5432,
                    "name": "postgres",
                    "username": "postgres"
                }
            }"#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.batch.max_size, BatchConfig::DEFAULT_MAX_SIZE);
        assert_eq!(config.staging.table, "alerts_staging");
        assert_eq!(config.channels.subscription_updates, "user_subscription_alerts");
    }
}
