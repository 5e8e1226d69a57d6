use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;

/// Destination index of the synced audit records.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkConfig {
    /// Keeps written records in process memory, for dry runs.
    Memory,
    Elasticsearch(ElasticsearchConfig),
}

impl SinkConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            SinkConfig::Memory => Ok(()),
            SinkConfig::Elasticsearch(config) => config.validate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ElasticsearchConfig {
    /// Base URL of the cluster, e.g. `http://localhost:9200`.
    pub url: String,
    /// Base name of the daily indices, suffixed with `-YYYY.MM.DD` on write.
    #[serde(default = "default_index")]
    pub index: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Timeout of a single bulk request, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ElasticsearchConfig {
    pub const DEFAULT_INDEX: &'static str = "pg_audit_logs";
    pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::invalid(
                "sink.elasticsearch.url",
                "must not be empty",
            ));
        }

        if self.index.trim().is_empty() {
            return Err(ValidationError::invalid(
                "sink.elasticsearch.index",
                "must not be empty",
            ));
        }

        if self.request_timeout_ms == 0 {
            return Err(ValidationError::invalid(
                "sink.elasticsearch.request_timeout_ms",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn default_index() -> String {
    ElasticsearchConfig::DEFAULT_INDEX.to_string()
}

fn default_request_timeout_ms() -> u64 {
    ElasticsearchConfig::DEFAULT_REQUEST_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elasticsearch_defaults_apply() {
        let config: SinkConfig =
            serde_json::from_str(r#"{"elasticsearch": {"url": "http://localhost:9200"}}"#)
                .unwrap();

        let SinkConfig::Elasticsearch(config) = config else {
            panic!("expected an elasticsearch sink");
        };
        assert_eq!(config.index, "pg_audit_logs");
        assert_eq!(config.request_timeout_ms, 30_000);
        assert!(config.password.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn memory_sink_from_unit_variant() {
        let config: SinkConfig = serde_json::from_str(r#""memory""#).unwrap();

        assert!(matches!(config, SinkConfig::Memory));
    }

    #[test]
    fn blank_index_is_rejected() {
        let config = ElasticsearchConfig {
            url: "http://localhost:9200".to_string(),
            index: " ".to_string(),
            username: None,
            password: None,
            request_timeout_ms: 1,
        };

        assert!(config.validate().is_err());
    }
}
