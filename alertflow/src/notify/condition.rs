//! Immediate reaction to condition on/off changes.
//!
//! Condition flips are rare and urgent, so they bypass the debouncer
//! entirely: each event triggers one fetch as soon as it arrives, events are
//! handled one at a time in arrival order, and there is no batching or
//! deduplication.

use tracing::{debug, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::AlertResult;
use crate::fetch::base::AlertFetcher;
use crate::notify::events::ConditionChangePayload;
use crate::notify::listener::ListenerHandle;
use crate::notify::source::NotificationSource;

/// Listens for condition on/off changes and recomputes affected alerts
/// immediately.
#[derive(Debug)]
pub struct ConditionChangeListener<N, F> {
    source: N,
    fetcher: F,
    shutdown_rx: ShutdownRx,
}

impl<N, F> ConditionChangeListener<N, F>
where
    N: NotificationSource + Send + 'static,
    F: AlertFetcher + Send + Sync + 'static,
{
    pub fn new(source: N, fetcher: F, shutdown_rx: ShutdownRx) -> Self {
        Self {
            source,
            fetcher,
            shutdown_rx,
        }
    }

    /// Starts the listener in a background task.
    pub fn start(self) -> ListenerHandle {
        ListenerHandle::new("condition-changes", tokio::spawn(self.run()))
    }

    async fn run(mut self) -> AlertResult<()> {
        info!(source = N::name(), "starting condition change listener");

        loop {
            tokio::select! {
                _ = self.shutdown_rx.wait_for_shutdown() => {
                    info!("shutdown signal received, stopping condition change listener");
                    return Ok(());
                }

                payload = self.source.recv() => {
                    let payload = payload?;

                    let change = match ConditionChangePayload::from_json(&payload) {
                        Ok(change) => change,
                        Err(err) => {
                            warn!(payload, error = %err, "skipping malformed condition change notification");
                            continue;
                        }
                    };

                    info!(
                        condition_id = change.id,
                        is_on = change.is_on,
                        "condition changed, recomputing affected alerts"
                    );

                    // A failed fetch only affects this event; the listener
                    // keeps consuming.
                    match self.fetcher.fetch_condition_alerts(change.id, change.is_on).await {
                        Ok(Some(alerts)) => {
                            debug!(
                                condition_id = change.id,
                                bytes = alerts.len(),
                                "recomputed alerts for condition change"
                            );
                        }
                        Ok(None) => {
                            debug!(condition_id = change.id, "no alerts affected by condition change");
                        }
                        Err(err) => {
                            warn!(
                                condition_id = change.id,
                                error = %err,
                                "failed to recompute alerts for condition change"
                            );
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
    use crate::error::ErrorKind;
    use crate::fetch::memory::MemoryFetcher;
    use crate::notify::source::create_memory_source;

    #[tokio::test]
    async fn each_change_triggers_one_immediate_fetch() {
        let fetcher = MemoryFetcher::new();
        let (notifier, source) = create_memory_source();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let _handle = ConditionChangeListener::new(source, fetcher.clone(), shutdown_rx).start();

        notifier.notify(r#"{"id": 3, "is_on": false}"#).await;
        notifier.notify(r#"{"id": 3, "is_on": true}"#).await;

        fetcher.wait_for_condition_calls(2).await;
        // No deduplication: both flips of the same condition are fetched,
        // in arrival order.
        assert_eq!(fetcher.condition_calls().await, vec![(3, false), (3, true)]);
    }

    #[tokio::test]
    async fn malformed_payload_is_skipped() {
        let fetcher = MemoryFetcher::new();
        let (notifier, source) = create_memory_source();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let _handle = ConditionChangeListener::new(source, fetcher.clone(), shutdown_rx).start();

        notifier.notify(r#"{"id": "three"}"#).await;
        notifier.notify(r#"{"id": 9, "is_on": true}"#).await;

        fetcher.wait_for_condition_calls(1).await;
        assert_eq!(fetcher.condition_calls().await, vec![(9, true)]);
    }

    #[tokio::test]
    async fn broken_source_terminates_with_an_error() {
        let fetcher = MemoryFetcher::new();
        let (notifier, source) = create_memory_source();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let handle = ConditionChangeListener::new(source, fetcher, shutdown_rx).start();

        drop(notifier);

        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
    }

    #[tokio::test]
    async fn shutdown_stops_the_listener() {
        let fetcher = MemoryFetcher::new();
        let (_notifier, source) = create_memory_source();
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let handle = ConditionChangeListener::new(source, fetcher, shutdown_rx).start();

        shutdown_tx.shutdown().unwrap();
        handle.wait().await.unwrap();
    }
}
