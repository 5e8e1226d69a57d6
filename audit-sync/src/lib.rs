//! Claim-and-dispatch pipeline moving audit records from Postgres to a search index.
//!
//! A [`pipeline::Pipeline`] claims batches of unprocessed rows from a [`store::SourceStore`],
//! hands them to a bounded pool of workers through a dispatch queue and writes them to a
//! [`sink::Sink`]. Claims whose batch was never written are returned to circulation by a
//! periodic reclaim, which gives at-least-once delivery.

pub mod concurrency;
pub mod error;
pub mod failpoints;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod sink;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transform;
pub mod types;
pub mod workers;
