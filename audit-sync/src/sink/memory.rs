use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::error::SyncResult;
use crate::sink::Sink;
use crate::types::IndexedRecord;

#[derive(Debug, Default)]
struct Inner {
    records: Vec<IndexedRecord>,
    bulk_writes: usize,
}

/// In-memory sink for dry runs and tests.
///
/// Everything written is kept until the process exits or [`MemorySink::clear`] is called.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record written so far, in write order.
    pub async fn records(&self) -> Vec<IndexedRecord> {
        let inner = self.inner.lock().await;
        inner.records.clone()
    }

    /// Returns the number of non-empty bulk writes received.
    pub async fn bulk_writes(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.bulk_writes
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.records.clear();
        inner.bulk_writes = 0;
    }
}

impl Sink for MemorySink {
    fn name() -> &'static str {
        "memory"
    }

    async fn bulk_write(&self, records: Vec<IndexedRecord>) -> SyncResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        info!(batch_size = records.len(), "writing records to memory sink");

        let mut inner = self.inner.lock().await;
        inner.records.extend(records);
        inner.bulk_writes += 1;

        Ok(())
    }
}
