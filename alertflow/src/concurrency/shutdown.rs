//! Graceful shutdown signaling for pipeline workers.
//!
//! A single [`ShutdownTx`] broadcasts a shutdown request to any number of
//! [`ShutdownRx`] receivers over a watch channel. Workers observe the signal
//! at their suspension points and exit cleanly; shutdown is never treated as
//! an error path.

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
///
/// Cloneable so that multiple owners (e.g. the pipeline and a ctrl-c handler)
/// can trigger shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Broadcasts the shutdown signal to all receivers.
    ///
    /// Fails when no receivers are alive, which means all workers already
    /// terminated.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<bool>> {
        self.0.send(true)
    }

    /// Creates a new receiver subscribed to this shutdown channel.
    ///
    /// Receivers created after the signal was sent still observe it.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns `true` once a shutdown signal has been sent.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Suspends until a shutdown signal is received.
    ///
    /// Also resolves when the transmitter is dropped, since a pipeline
    /// without an owner has no way to keep running.
    pub async fn wait_for_shutdown(&mut self) {
        // An error means the sender is gone, which we treat as shutdown.
        let _ = self.0.wait_for(|shutdown| *shutdown).await;
    }
}

/// Creates a new shutdown channel in the "not signaled" state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn receivers_observe_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        assert!(!rx.is_shutdown());

        tx.shutdown().unwrap();

        assert!(rx.is_shutdown());
        timeout(Duration::from_secs(1), rx.wait_for_shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn late_subscribers_observe_earlier_shutdown() {
        let (tx, _rx) = create_shutdown_channel();
        tx.shutdown().unwrap();

        let rx = tx.subscribe();
        assert!(rx.is_shutdown());
    }

    #[tokio::test]
    async fn dropped_transmitter_unblocks_waiters() {
        let (tx, mut rx) = create_shutdown_channel();
        drop(tx);

        timeout(Duration::from_secs(1), rx.wait_for_shutdown())
            .await
            .unwrap();
    }
}
