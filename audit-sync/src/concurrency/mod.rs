//! Concurrency primitives shared by the pipeline tasks.
//!
//! Every long-running task subscribes to the same [`shutdown`] channel. The poller stops
//! claiming when it fires, the reaper exits, and workers keep draining the dispatch queue until
//! the poller has closed it.

pub mod shutdown;
