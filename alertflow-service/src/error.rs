use alertflow::error::AlertError;
use alertflow_config::load::LoadConfigError;
use alertflow_config::shared::ValidationError;
use thiserror::Error;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error type for the alertflow service binary.
///
/// Wraps [`AlertError`] for pipeline errors and provides variants for
/// configuration and infrastructure failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Configuration could not be assembled from files and environment.
    #[error("configuration error: {0}")]
    Config(#[from] LoadConfigError),

    /// Configuration was assembled but holds an invalid value.
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    /// The pipeline failed.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] AlertError),

    /// The async runtime could not be built.
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}
