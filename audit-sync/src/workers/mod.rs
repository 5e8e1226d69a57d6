//! Long-running tasks of the sync pipeline.
//!
//! The [`poller::ClaimPoller`] feeds claimed batches into a bounded queue drained by the
//! [`pool::WorkerPool`]. The [`reaper::StaleClaimReaper`] runs beside them against the store.

pub mod poller;
pub mod pool;
pub mod reaper;
