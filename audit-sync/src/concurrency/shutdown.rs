use tokio::sync::watch;

/// Creates a connected shutdown sender and receiver.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

/// Sending half of the process-wide shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Signals shutdown to every subscribed receiver. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    /// Returns a new receiver. It observes a shutdown that was already signalled.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiving half of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Completes once shutdown is signalled.
    ///
    /// Also completes when every sender is dropped, since no signal can arrive afterwards.
    pub async fn wait_for_shutdown(&mut self) {
        let _ = self.0.wait_for(|shutdown| *shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribers_observe_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        let mut late = tx.subscribe();

        assert!(!rx.is_shutdown());

        let waiter = tokio::spawn(async move {
            rx.wait_for_shutdown().await;
            rx.is_shutdown()
        });

        tx.shutdown();
        assert!(waiter.await.unwrap());

        late.wait_for_shutdown().await;
        assert!(tx.subscribe().is_shutdown());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wait_does_not_complete_without_signal() {
        let (_tx, mut rx) = create_shutdown_channel();

        let result = tokio::time::timeout(Duration::from_millis(50), rx.wait_for_shutdown()).await;

        assert!(result.is_err());
    }
}
