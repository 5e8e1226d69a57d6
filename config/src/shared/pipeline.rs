use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::ValidationError;

/// Timestamp a stale-claim reclaim compares against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReclaimPolicy {
    /// Compares against the row's creation time.
    ///
    /// A row that waited unclaimed for longer than the reclaim age becomes eligible for
    /// reclaim as soon as it is claimed, so it may be processed twice.
    #[default]
    CreatedAt,
    /// Compares against the time the row was claimed.
    ClaimedAt,
}

/// Identifier attached to documents written to the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentIdPolicy {
    /// The sink assigns ids, so a reprocessed row yields a second document.
    #[default]
    None,
    /// The id is derived from the source row id, so a reprocessed row overwrites its document.
    SourceId,
}

/// Claim, dispatch and reclaim settings of the sync pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Maximum number of rows claimed per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of concurrent workers writing batches to the sink.
    #[serde(default = "default_workers")]
    pub workers: u16,
    /// Capacity of the dispatch queue between the poller and the workers.
    ///
    /// Defaults to the number of workers when unset.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    /// Delay before polling again after an empty or failed claim, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Period of the stale-claim reaper, in milliseconds.
    #[serde(default = "default_reclaim_interval_ms")]
    pub reclaim_interval_ms: u64,
    /// Age after which a claimed row is returned to the unclaimed pool, in milliseconds.
    #[serde(default = "default_reclaim_age_ms")]
    pub reclaim_age_ms: u64,
    #[serde(default)]
    pub reclaim_policy: ReclaimPolicy,
    #[serde(default)]
    pub document_id_policy: DocumentIdPolicy,
}

impl PipelineConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 1000;
    pub const DEFAULT_WORKERS: u16 = 5;
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
    pub const DEFAULT_RECLAIM_INTERVAL_MS: u64 = 5 * 60 * 1_000;
    pub const DEFAULT_RECLAIM_AGE_MS: u64 = 10 * 60 * 1_000;

    /// Returns the dispatch queue capacity, falling back to the worker count.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.workers as usize)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_millis(self.reclaim_interval_ms)
    }

    pub fn reclaim_age(&self) -> Duration {
        Duration::from_millis(self.reclaim_age_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::invalid(
                "pipeline.batch_size",
                "must be greater than 0",
            ));
        }

        if self.workers == 0 {
            return Err(ValidationError::WorkersZero);
        }

        if self.queue_capacity() == 0 {
            return Err(ValidationError::invalid(
                "pipeline.queue_capacity",
                "must be greater than 0",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(ValidationError::invalid(
                "pipeline.poll_interval_ms",
                "must be greater than 0",
            ));
        }

        if self.reclaim_interval_ms == 0 {
            return Err(ValidationError::invalid(
                "pipeline.reclaim_interval_ms",
                "must be greater than 0",
            ));
        }

        if self.reclaim_age_ms == 0 {
            return Err(ValidationError::invalid(
                "pipeline.reclaim_age_ms",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            queue_capacity: None,
            poll_interval_ms: default_poll_interval_ms(),
            reclaim_interval_ms: default_reclaim_interval_ms(),
            reclaim_age_ms: default_reclaim_age_ms(),
            reclaim_policy: ReclaimPolicy::default(),
            document_id_policy: DocumentIdPolicy::default(),
        }
    }
}

fn default_batch_size() -> usize {
    PipelineConfig::DEFAULT_BATCH_SIZE
}

fn default_workers() -> u16 {
    PipelineConfig::DEFAULT_WORKERS
}

fn default_poll_interval_ms() -> u64 {
    PipelineConfig::DEFAULT_POLL_INTERVAL_MS
}

fn default_reclaim_interval_ms() -> u64 {
    PipelineConfig::DEFAULT_RECLAIM_INTERVAL_MS
}

fn default_reclaim_age_ms() -> u64 {
    PipelineConfig::DEFAULT_RECLAIM_AGE_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.workers, 5);
        assert_eq!(config.queue_capacity(), 5);
        assert_eq!(config.reclaim_age(), Duration::from_secs(600));
        assert_eq!(config.reclaim_policy, ReclaimPolicy::CreatedAt);
        assert_eq!(config.document_id_policy, DocumentIdPolicy::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn policies_deserialize_from_snake_case() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"reclaim_policy": "claimed_at", "document_id_policy": "source_id", "queue_capacity": 2}"#,
        )
        .unwrap();

        assert_eq!(config.reclaim_policy, ReclaimPolicy::ClaimedAt);
        assert_eq!(config.document_id_policy, DocumentIdPolicy::SourceId);
        assert_eq!(config.queue_capacity(), 2);
    }

    #[test]
    fn zero_values_are_rejected() {
        let config = PipelineConfig {
            workers: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::WorkersZero)
        ));

        let config = PipelineConfig {
            queue_capacity: Some(0),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { field, .. }) if field == "pipeline.queue_capacity"
        ));

        let config = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
