use alertflow_config::load::load_config;
use alertflow_config::shared::ServiceConfig;

use crate::error::ServiceResult;

/// Loads and validates the service configuration.
pub fn load_service_config() -> ServiceResult<ServiceConfig> {
    let config = load_config::<ServiceConfig>()?;
    config.validate()?;

    Ok(config)
}
