//! Sources of audit records.
//!
//! A [`SourceStore`] hands out batches of unclaimed records through an atomic claim and puts
//! stale claims back into circulation through a reclaim.

mod base;
pub mod memory;
pub mod postgres;

pub use base::SourceStore;
