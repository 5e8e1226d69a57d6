use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, SyncResult};
use crate::metrics::{
    AUDIT_SYNC_RECLAIM_FAILURES_TOTAL, AUDIT_SYNC_RECORDS_RECLAIMED_TOTAL, ERROR_KIND_LABEL,
};
use crate::store::SourceStore;
use crate::sync_error;

#[derive(Debug)]
pub struct StaleClaimReaperHandle {
    join_handle: JoinHandle<SyncResult<()>>,
}

impl StaleClaimReaperHandle {
    pub async fn wait(self) -> SyncResult<()> {
        match self.join_handle.await {
            Ok(result) => result,
            Err(err) => Err(sync_error!(
                ErrorKind::ReaperPanic,
                "Stale claim reaper panicked",
                err
            )),
        }
    }
}

/// Periodically returns claims older than the reclaim age to the unclaimed pool.
///
/// The first reclaim happens one interval after start. Failures are retried on the next tick.
#[derive(Debug)]
pub struct StaleClaimReaper<S> {
    store: S,
    interval: Duration,
    age: Duration,
    shutdown_rx: ShutdownRx,
}

impl<S> StaleClaimReaper<S>
where
    S: SourceStore + Send + Sync + 'static,
{
    pub fn new(store: S, interval: Duration, age: Duration, shutdown_rx: ShutdownRx) -> Self {
        Self {
            store,
            interval,
            age,
            shutdown_rx,
        }
    }

    pub fn start(self) -> StaleClaimReaperHandle {
        let join_handle = tokio::spawn(self.run());
        StaleClaimReaperHandle { join_handle }
    }

    async fn run(mut self) -> SyncResult<()> {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            age_ms = self.age.as_millis() as u64,
            "starting stale claim reaper"
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.reclaim().await,
                _ = self.shutdown_rx.wait_for_shutdown() => break,
            }
        }

        info!("stale claim reaper stopped");

        Ok(())
    }

    async fn reclaim(&self) {
        match self.store.reclaim_stale(self.age).await {
            Ok(0) => debug!("no stale claims to reclaim"),
            Ok(reclaimed) => {
                counter!(AUDIT_SYNC_RECORDS_RECLAIMED_TOTAL).increment(reclaimed);
                info!(reclaimed, "returned stale claims to the unclaimed pool");
            }
            Err(err) => {
                counter!(
                    AUDIT_SYNC_RECLAIM_FAILURES_TOTAL,
                    ERROR_KIND_LABEL => format!("{:?}", err.kind())
                )
                .increment(1);
                error!(error = %err, "failed to reclaim stale claims");
            }
        }
    }
}
