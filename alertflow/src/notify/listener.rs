//! Listener relaying subscription-update notifications into the debouncer.
//!
//! One task per notification channel. The listener parses each payload and
//! forwards every affected subscription id into the bounded relay; a full
//! relay applies backpressure on the listener rather than dropping ids.
//! Malformed payloads are logged and skipped, a broken source terminates the
//! listener with an error.

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::alert_error;
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{AlertResult, ErrorKind};
use crate::notify::RelayTx;
use crate::notify::events::UpdatePayload;
use crate::notify::source::NotificationSource;

/// Handle to a running notification listener task.
#[derive(Debug)]
pub struct ListenerHandle {
    name: &'static str,
    join_handle: JoinHandle<AlertResult<()>>,
}

impl ListenerHandle {
    pub(crate) fn new(name: &'static str, join_handle: JoinHandle<AlertResult<()>>) -> Self {
        Self { name, join_handle }
    }

    /// Waits for the listener to complete.
    pub async fn wait(self) -> AlertResult<()> {
        match self.join_handle.await {
            Ok(result) => result,
            Err(err) => {
                error!(listener = self.name, error = %err, "listener task panicked");
                Err(alert_error!(
                    ErrorKind::ListenerPanic,
                    "A notification listener panicked",
                    self.name
                ))
            }
        }
    }
}

/// Relays subscription update notifications into the dirty-key relay.
#[derive(Debug)]
pub struct UpdateListener<N> {
    source: N,
    relay_tx: RelayTx,
    shutdown_rx: ShutdownRx,
}

impl<N> UpdateListener<N>
where
    N: NotificationSource + Send + 'static,
{
    pub fn new(source: N, relay_tx: RelayTx, shutdown_rx: ShutdownRx) -> Self {
        Self {
            source,
            relay_tx,
            shutdown_rx,
        }
    }

    /// Starts the listener in a background task.
    pub fn start(self) -> ListenerHandle {
        ListenerHandle::new("subscription-updates", tokio::spawn(self.run()))
    }

    async fn run(mut self) -> AlertResult<()> {
        info!(source = N::name(), "starting subscription update listener");

        loop {
            tokio::select! {
                _ = self.shutdown_rx.wait_for_shutdown() => {
                    info!("shutdown signal received, stopping subscription update listener");
                    return Ok(());
                }

                payload = self.source.recv() => {
                    // A recv failure means the source connection is gone; the
                    // listener cannot make progress anymore.
                    let payload = payload?;

                    let update = match UpdatePayload::from_json(&payload) {
                        Ok(update) => update,
                        Err(err) => {
                            warn!(payload, error = %err, "skipping malformed update notification");
                            continue;
                        }
                    };

                    debug!(subscriptions = update.ids.len(), "relaying update notification");
                    for id in update.ids {
                        tokio::select! {
                            _ = self.shutdown_rx.wait_for_shutdown() => {
                                info!("shutdown signal received while relaying, stopping");
                                return Ok(());
                            }
                            sent = self.relay_tx.send(id.into()) => {
                                if sent.is_err() {
                                    // The debouncer is gone, so there is
                                    // nobody left to relay to.
                                    info!("dirty-key relay closed, stopping subscription update listener");
                                    return Ok(());
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::notify::create_relay;
    use crate::notify::source::create_memory_source;
    use crate::types::SubscriptionId;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn relays_every_id_of_a_notification() {
        let (notifier, source) = create_memory_source();
        let (relay_tx, mut relay_rx) = create_relay(16);
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let _handle = UpdateListener::new(source, relay_tx, shutdown_rx).start();

        notifier.notify(r#"{"ids": [5, 7, 9]}"#).await;

        for expected in [5, 7, 9] {
            let id = timeout(Duration::from_secs(1), relay_rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(id, SubscriptionId(expected));
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_skipped() {
        let (notifier, source) = create_memory_source();
        let (relay_tx, mut relay_rx) = create_relay(16);
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let _handle = UpdateListener::new(source, relay_tx, shutdown_rx).start();

        notifier.notify("not json at all").await;
        notifier.notify(r#"{"ids": [11]}"#).await;

        // The malformed payload is dropped; the listener keeps going.
        let id = timeout(Duration::from_secs(1), relay_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id, SubscriptionId(11));
    }

    #[tokio::test]
    async fn broken_source_terminates_with_an_error() {
        let (notifier, source) = create_memory_source();
        let (relay_tx, _relay_rx) = create_relay(16);
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let handle = UpdateListener::new(source, relay_tx, shutdown_rx).start();

        drop(notifier);

        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
    }

    #[tokio::test]
    async fn shutdown_stops_the_listener() {
        let (_notifier, source) = create_memory_source();
        let (relay_tx, _relay_rx) = create_relay(16);
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let handle = UpdateListener::new(source, relay_tx, shutdown_rx).start();

        shutdown_tx.shutdown().unwrap();
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_blocked_relay_send() {
        let (notifier, source) = create_memory_source();
        // The receiver is kept alive but never drained, so the listener
        // blocks in the relay send.
        let (relay_tx, _relay_rx) = create_relay(1);
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let handle = UpdateListener::new(source, relay_tx, shutdown_rx).start();

        notifier.notify(r#"{"ids": [1, 2, 3]}"#).await;
        sleep(Duration::from_millis(50)).await;

        shutdown_tx.shutdown().unwrap();

        timeout(Duration::from_secs(1), handle.wait())
            .await
            .expect("listener must stop while blocked on a full relay")
            .unwrap();
    }

    #[tokio::test]
    async fn full_relay_applies_backpressure_instead_of_dropping() {
        let (notifier, source) = create_memory_source();
        let (relay_tx, mut relay_rx) = create_relay(1);
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let _handle = UpdateListener::new(source, relay_tx, shutdown_rx).start();

        notifier.notify(r#"{"ids": [1, 2, 3]}"#).await;

        // Drain slowly; every id must still arrive, in order.
        for expected in [1, 2, 3] {
            let id = timeout(Duration::from_secs(1), relay_rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(id, SubscriptionId(expected));
        }
    }
}
