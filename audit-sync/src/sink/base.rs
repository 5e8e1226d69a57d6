use std::future::Future;

use crate::error::SyncResult;
use crate::types::IndexedRecord;

/// Search or analytics index receiving audit documents.
///
/// A bulk write is all-or-nothing at the call boundary. When it fails the caller must assume
/// that any subset of the documents may have been written.
pub trait Sink {
    /// Returns the name of the sink.
    fn name() -> &'static str;

    /// Writes a batch of documents in a single request. An empty batch is a no-op.
    fn bulk_write(
        &self,
        records: Vec<IndexedRecord>,
    ) -> impl Future<Output = SyncResult<()>> + Send;
}
