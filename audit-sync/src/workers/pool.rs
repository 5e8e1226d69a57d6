use std::sync::Arc;

use config::shared::DocumentIdPolicy;
use metrics::{counter, gauge};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::{ErrorKind, SyncResult};
use crate::failpoints::{WORKER_BEFORE_BULK_WRITE, sync_fail_point};
use crate::metrics::{
    AUDIT_SYNC_BATCHES_IN_FLIGHT, AUDIT_SYNC_BULK_WRITE_FAILURES_TOTAL,
    AUDIT_SYNC_RECORDS_INDEXED_TOTAL, ERROR_KIND_LABEL,
};
use crate::sink::Sink;
use crate::sync_error;
use crate::transform::transform_batch;
use crate::types::{Batch, IndexedRecord};

/// Receiving end of the dispatch queue, shared by every worker.
type SharedQueue = Arc<Mutex<mpsc::Receiver<Batch>>>;

/// Fixed set of workers writing dispatched batches to the sink.
///
/// Workers exit once the queue is closed and empty, so batches queued before shutdown are still
/// written.
#[derive(Debug)]
pub struct WorkerPool {
    join_set: JoinSet<SyncResult<()>>,
}

impl WorkerPool {
    pub fn start<K>(
        workers: u16,
        sink: K,
        queue_rx: mpsc::Receiver<Batch>,
        document_id_policy: DocumentIdPolicy,
    ) -> Self
    where
        K: Sink + Clone + Send + Sync + 'static,
    {
        let queue_rx: SharedQueue = Arc::new(Mutex::new(queue_rx));
        let mut join_set = JoinSet::new();

        for worker_id in 0..workers {
            let worker = BatchWorker {
                worker_id,
                sink: sink.clone(),
                queue_rx: queue_rx.clone(),
                document_id_policy,
            };
            join_set.spawn(worker.run());
        }

        info!(workers, sink = K::name(), "started worker pool");

        Self { join_set }
    }

    /// Waits for every worker to exit, aggregating the errors of those that failed.
    pub async fn wait_all(mut self) -> SyncResult<()> {
        let mut errors = Vec::new();

        while let Some(result) = self.join_set.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(error = %err, "worker completed with error");
                    errors.push(err);
                }
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        debug!("worker task was cancelled");
                    } else {
                        errors.push(sync_error!(
                            ErrorKind::WorkerPanic,
                            "Batch worker panicked",
                            join_err
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}

struct BatchWorker<K> {
    worker_id: u16,
    sink: K,
    queue_rx: SharedQueue,
    document_id_policy: DocumentIdPolicy,
}

impl<K> BatchWorker<K>
where
    K: Sink + Send + Sync + 'static,
{
    async fn run(self) -> SyncResult<()> {
        debug!(worker_id = self.worker_id, "starting batch worker");

        loop {
            // The lock is released as soon as a batch is taken, so only idle workers wait on it.
            let batch = {
                let mut queue_rx = self.queue_rx.lock().await;
                queue_rx.recv().await
            };

            let Some(batch) = batch else {
                break;
            };

            self.process(batch).await;
        }

        debug!(worker_id = self.worker_id, "dispatch queue closed, batch worker stopped");

        Ok(())
    }

    async fn process(&self, batch: Batch) {
        let batch_size = batch.len();
        let records = transform_batch(&batch, self.document_id_policy);

        gauge!(AUDIT_SYNC_BATCHES_IN_FLIGHT).increment(1.0);
        let result = self.write(records).await;
        gauge!(AUDIT_SYNC_BATCHES_IN_FLIGHT).decrement(1.0);

        match result {
            Ok(()) => {
                counter!(AUDIT_SYNC_RECORDS_INDEXED_TOTAL).increment(batch_size as u64);
                info!(worker_id = self.worker_id, batch_size, "batch written to sink");
            }
            Err(err) => {
                counter!(
                    AUDIT_SYNC_BULK_WRITE_FAILURES_TOTAL,
                    ERROR_KIND_LABEL => format!("{:?}", err.kind())
                )
                .increment(1);
                error!(
                    worker_id = self.worker_id,
                    batch_size,
                    error = %err,
                    "bulk write failed, batch left for reclaim"
                );
            }
        }
    }

    async fn write(&self, records: Vec<IndexedRecord>) -> SyncResult<()> {
        sync_fail_point(WORKER_BEFORE_BULK_WRITE)?;

        self.sink.bulk_write(records).await
    }
}
