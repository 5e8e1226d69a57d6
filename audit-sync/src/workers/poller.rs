use std::time::Duration;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, SyncResult};
use crate::failpoints::{POLLER_BEFORE_CLAIM, sync_fail_point};
use crate::metrics::{
    AUDIT_SYNC_BATCHES_DISPATCHED_TOTAL, AUDIT_SYNC_CLAIM_FAILURES_TOTAL,
    AUDIT_SYNC_RECORDS_CLAIMED_TOTAL, ERROR_KIND_LABEL,
};
use crate::store::SourceStore;
use crate::sync_error;
use crate::types::Batch;

/// Handle of a running [`ClaimPoller`].
#[derive(Debug)]
pub struct ClaimPollerHandle {
    join_handle: JoinHandle<SyncResult<()>>,
}

impl ClaimPollerHandle {
    pub async fn wait(self) -> SyncResult<()> {
        match self.join_handle.await {
            Ok(result) => result,
            Err(err) => Err(sync_error!(
                ErrorKind::PollerPanic,
                "Claim poller panicked",
                err
            )),
        }
    }
}

/// Claims batches from the store and pushes them onto the dispatch queue.
///
/// Pushing suspends while the queue is full, which is what bounds the number of claimed but
/// unwritten batches. Dropping the poller closes the queue.
#[derive(Debug)]
pub struct ClaimPoller<S> {
    store: S,
    batch_size: usize,
    poll_interval: Duration,
    queue_tx: mpsc::Sender<Batch>,
    shutdown_rx: ShutdownRx,
}

impl<S> ClaimPoller<S>
where
    S: SourceStore + Send + Sync + 'static,
{
    pub fn new(
        store: S,
        batch_size: usize,
        poll_interval: Duration,
        queue_tx: mpsc::Sender<Batch>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            store,
            batch_size,
            poll_interval,
            queue_tx,
            shutdown_rx,
        }
    }

    pub fn start(self) -> ClaimPollerHandle {
        let join_handle = tokio::spawn(self.run());
        ClaimPollerHandle { join_handle }
    }

    async fn run(mut self) -> SyncResult<()> {
        info!(
            batch_size = self.batch_size,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "starting claim poller"
        );

        while !self.shutdown_rx.is_shutdown() {
            match self.claim().await {
                Ok(batch) if batch.is_empty() => {
                    debug!("no unclaimed audit records");

                    if !self.idle().await {
                        break;
                    }
                }
                Ok(batch) => {
                    if !self.dispatch(batch).await {
                        break;
                    }
                }
                Err(err) => {
                    counter!(
                        AUDIT_SYNC_CLAIM_FAILURES_TOTAL,
                        ERROR_KIND_LABEL => format!("{:?}", err.kind())
                    )
                    .increment(1);
                    error!(error = %err, "failed to claim audit records");

                    if !self.idle().await {
                        break;
                    }
                }
            }
        }

        info!("claim poller stopped, closing dispatch queue");

        Ok(())
    }

    async fn claim(&self) -> SyncResult<Batch> {
        sync_fail_point(POLLER_BEFORE_CLAIM)?;

        self.store.claim_batch(self.batch_size).await
    }

    /// Pushes a batch onto the queue. Returns `false` when the poller must stop.
    async fn dispatch(&mut self, batch: Batch) -> bool {
        let batch_size = batch.len();
        counter!(AUDIT_SYNC_RECORDS_CLAIMED_TOTAL).increment(batch_size as u64);
        info!(batch_size, "claimed audit records");

        // A claimed batch goes onto the queue whenever there is room, even after shutdown.
        tokio::select! {
            biased;

            result = self.queue_tx.send(batch) => {
                if result.is_err() {
                    error!(batch_size, "dispatch queue closed, stopping claim poller");
                    return false;
                }

                counter!(AUDIT_SYNC_BATCHES_DISPATCHED_TOTAL).increment(1);
                true
            }
            _ = self.shutdown_rx.wait_for_shutdown() => {
                warn!(
                    batch_size,
                    "shutdown while waiting for queue capacity, batch left for reclaim"
                );
                false
            }
        }
    }

    /// Sleeps for the poll interval. Returns `false` when shutdown arrives first.
    async fn idle(&mut self) -> bool {
        tokio::select! {
            _ = sleep(self.poll_interval) => true,
            _ = self.shutdown_rx.wait_for_shutdown() => false,
        }
    }
}
