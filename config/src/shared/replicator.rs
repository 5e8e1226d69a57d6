use serde::Deserialize;
use std::time::Duration;

use crate::Config;
use crate::shared::{PgConnectionConfig, PipelineConfig, SinkConfig, ValidationError};

/// Source database settings: where the audit table lives and how to pool connections to it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceConfig {
    pub connection: PgConnectionConfig,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Maximum lifetime of a pooled connection, in seconds.
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
    /// Whether the replicator runs the audit table migrations at startup.
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl SourceConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 50;
    pub const DEFAULT_MAX_LIFETIME_SECS: u64 = 300;

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.connection.tls.validate()?;

        if self.max_connections == 0 {
            return Err(ValidationError::invalid(
                "source.max_connections",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn default_max_connections() -> u32 {
    SourceConfig::DEFAULT_MAX_CONNECTIONS
}

fn default_max_lifetime_secs() -> u64 {
    SourceConfig::DEFAULT_MAX_LIFETIME_SECS
}

fn default_run_migrations() -> bool {
    true
}

/// Complete configuration of the replicator service.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid leaking the
/// secrets it holds.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicatorConfig {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl ReplicatorConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.sink.validate()?;
        self.pipeline.validate()
    }
}

impl Config for ReplicatorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
