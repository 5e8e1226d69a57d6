use config::shared::PipelineConfig;
use tokio::sync::mpsc;
use tracing::info;

use crate::bail;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::error::{ErrorKind, SyncResult};
use crate::sink::Sink;
use crate::store::SourceStore;
use crate::workers::poller::{ClaimPoller, ClaimPollerHandle};
use crate::workers::pool::WorkerPool;
use crate::workers::reaper::{StaleClaimReaper, StaleClaimReaperHandle};

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started {
        poller: ClaimPollerHandle,
        pool: WorkerPool,
        reaper: StaleClaimReaperHandle,
    },
}

/// Moves audit records from a [`SourceStore`] to a [`Sink`].
///
/// On shutdown the poller stops claiming and closes the dispatch queue, the workers write what
/// was already queued, and the reaper exits. Records that were claimed but not written are
/// picked up again once the reclaim age passes.
#[derive(Debug)]
pub struct Pipeline<S, K> {
    config: PipelineConfig,
    store: S,
    sink: K,
    state: PipelineState,
    shutdown_tx: ShutdownTx,
}

impl<S, K> Pipeline<S, K>
where
    S: SourceStore + Clone + Send + Sync + 'static,
    K: Sink + Clone + Send + Sync + 'static,
{
    pub fn new(config: PipelineConfig, store: S, sink: K) -> Self {
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            config,
            store,
            sink,
            state: PipelineState::NotStarted,
            shutdown_tx,
        }
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Spawns the workers, the reaper and the poller.
    pub async fn start(&mut self) -> SyncResult<()> {
        if matches!(self.state, PipelineState::Started { .. }) {
            bail!(ErrorKind::InvalidState, "Pipeline was already started");
        }

        if let Err(err) = self.config.validate() {
            bail!(
                ErrorKind::ConfigError,
                "Invalid pipeline configuration",
                err
            );
        }

        info!(
            batch_size = self.config.batch_size,
            workers = self.config.workers,
            queue_capacity = self.config.queue_capacity(),
            sink = K::name(),
            "starting audit sync pipeline"
        );

        let (queue_tx, queue_rx) = mpsc::channel(self.config.queue_capacity());

        // Workers start first so the poller never waits on a queue nobody drains.
        let pool = WorkerPool::start(
            self.config.workers,
            self.sink.clone(),
            queue_rx,
            self.config.document_id_policy,
        );

        let reaper = StaleClaimReaper::new(
            self.store.clone(),
            self.config.reclaim_interval(),
            self.config.reclaim_age(),
            self.shutdown_tx.subscribe(),
        )
        .start();

        let poller = ClaimPoller::new(
            self.store.clone(),
            self.config.batch_size,
            self.config.poll_interval(),
            queue_tx,
            self.shutdown_tx.subscribe(),
        )
        .start();

        self.state = PipelineState::Started {
            poller,
            pool,
            reaper,
        };

        Ok(())
    }

    /// Waits for every task to stop. Only returns after shutdown has been signalled, unless a
    /// task fails.
    pub async fn wait(self) -> SyncResult<()> {
        let PipelineState::Started {
            poller,
            pool,
            reaper,
        } = self.state
        else {
            info!("pipeline was not started, nothing to wait for");

            return Ok(());
        };

        let mut errors = vec![];

        // The poller owns the queue sender, so the workers can only finish once it has stopped.
        if let Err(err) = poller.wait().await {
            errors.push(err);

            // Without a poller nothing new reaches the workers, so the rest is stopped too.
            self.shutdown_tx.shutdown();

            info!("claim poller failed, shutting down the pipeline");
        }

        info!("waiting for batch workers to drain the dispatch queue");

        if let Err(err) = pool.wait_all().await {
            let errors_number = err.kinds().len();
            errors.push(err);

            info!("{} batch workers failed", errors_number);
        }

        if let Err(err) = reaper.wait().await {
            errors.push(err);
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        info!("audit sync pipeline stopped");

        Ok(())
    }

    pub fn shutdown(&self) {
        info!("shutting down the audit sync pipeline");

        self.shutdown_tx.shutdown();
    }

    pub async fn shutdown_and_wait(self) -> SyncResult<()> {
        self.shutdown();
        self.wait().await
    }
}
