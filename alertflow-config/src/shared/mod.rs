//! Shared configuration types for the alert ingestion and notification pipeline.

mod batch;
mod connection;
mod debounce;
mod mock;
mod service;

pub use batch::{BatchConfig, IngestConfig};
pub use connection::PgConnectionConfig;
pub use debounce::DebounceConfig;
pub use mock::MockConfig;
pub use service::{ChannelsConfig, ServiceConfig, StagingConfig};

use thiserror::Error;

/// Error returned when a configuration value violates a constraint.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A field holds a value outside its allowed range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue {
        field: &'static str,
        constraint: &'static str,
    },
}
