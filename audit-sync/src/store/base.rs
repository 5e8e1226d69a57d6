use std::future::Future;
use std::time::Duration;

use crate::error::SyncResult;
use crate::types::Batch;

/// Table of audit records that supports exclusive claiming.
///
/// Implementations must guarantee that concurrent [`SourceStore::claim_batch`] calls never
/// return the same record, and that a failed claim leaves no record claimed.
pub trait SourceStore {
    /// Claims up to `limit` unclaimed records, oldest first.
    ///
    /// Returns an empty batch when nothing is eligible.
    fn claim_batch(&self, limit: usize) -> impl Future<Output = SyncResult<Batch>> + Send;

    /// Returns every claimed record whose reference timestamp is at least `age` old to the
    /// unclaimed pool, and returns how many were reverted.
    fn reclaim_stale(&self, age: Duration) -> impl Future<Output = SyncResult<u64>> + Send;
}
