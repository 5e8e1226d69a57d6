//! Utilities for testing the sync pipeline.
//!
//! The wrappers record what flows through a store or a sink and let a test wait for a condition
//! through a [`notify::TimedNotify`], so tests never hang when the condition is never reached.
//! [`database`] creates throwaway Postgres databases with the audit table migrated.

pub mod database;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod notify;
pub mod test_sink_wrapper;
pub mod test_store_wrapper;
