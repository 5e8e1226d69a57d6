use config::load_config;
use config::shared::ReplicatorConfig;

use crate::error::{ReplicatorError, ReplicatorResult};

/// Loads the replicator configuration and validates it before anything is started.
pub fn load_replicator_config() -> ReplicatorResult<ReplicatorConfig> {
    let config = load_config::<ReplicatorConfig>().map_err(ReplicatorError::config)?;
    config.validate().map_err(ReplicatorError::config)?;

    Ok(config)
}
