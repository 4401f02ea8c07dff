//! Assembly and lifecycle of the alert pipeline.
//!
//! [`AlertPipeline`] owns the two halves of the system: the ingestion
//! batching worker draining the observation queue into the staging sink, and
//! the notification path (update listener, debouncer, condition-change
//! listener) recomputing alerts through the fetcher. All workers share one
//! shutdown channel; shutting the pipeline down stops every worker at its
//! next suspension point.

use std::sync::Arc;

use tracing::{error, info};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::config::ServiceConfig;
use crate::error::{AlertResult, ErrorKind};
use crate::fetch::base::AlertFetcher;
use crate::ingest::{IngestQueue, IngestWorker, IngestWorkerHandle, create_ingest_queue};
use crate::notify::condition::ConditionChangeListener;
use crate::notify::create_relay;
use crate::notify::debouncer::UpdateDebouncer;
use crate::notify::listener::{ListenerHandle, UpdateListener};
use crate::notify::source::NotificationSource;
use crate::sink::base::StagingSink;

/// The notification sources the pipeline listens on, one per channel.
#[derive(Debug)]
pub struct NotificationSources<N> {
    /// Source of batched subscription-update events.
    pub updates: N,
    /// Source of immediate condition-change events.
    pub condition_changes: N,
}

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started {
        queue: IngestQueue,
        ingest_worker: IngestWorkerHandle,
        update_listener: ListenerHandle,
        debouncer: ListenerHandle,
        condition_listener: ListenerHandle,
    },
}

/// The fully assembled alert pipeline.
#[derive(Debug)]
pub struct AlertPipeline<S, F, N> {
    config: Arc<ServiceConfig>,
    sink: S,
    fetcher: F,
    sources: Option<NotificationSources<N>>,
    state: PipelineState,
    shutdown_tx: ShutdownTx,
}

impl<S, F, N> AlertPipeline<S, F, N>
where
    S: StagingSink + Clone + Send + Sync + 'static,
    F: AlertFetcher + Clone + Send + Sync + 'static,
    N: NotificationSource + Send + 'static,
{
    pub fn new(
        config: ServiceConfig,
        sink: S,
        fetcher: F,
        sources: NotificationSources<N>,
    ) -> Self {
        // The receiver side is never stored; workers subscribe to the
        // transmitter as they are created.
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            config: Arc::new(config),
            sink,
            fetcher,
            sources: Some(sources),
            state: PipelineState::NotStarted,
            shutdown_tx,
        }
    }

    /// Returns a transmitter to trigger shutdown from outside the pipeline,
    /// e.g. from a ctrl-c handler.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Returns the producer-facing observation queue.
    ///
    /// Fails until [`AlertPipeline::start`] was called, since the queue only
    /// exists together with the worker draining it.
    pub fn queue(&self) -> AlertResult<IngestQueue> {
        let PipelineState::Started { queue, .. } = &self.state else {
            bail!(
                ErrorKind::InvalidState,
                "The pipeline was not started, no observation queue exists"
            );
        };

        Ok(queue.clone())
    }

    /// Starts all pipeline workers.
    pub fn start(&mut self) -> AlertResult<()> {
        let Some(sources) = self.sources.take() else {
            bail!(ErrorKind::InvalidState, "The pipeline was already started");
        };

        info!(
            sink = S::name(),
            fetcher = F::name(),
            "starting alert pipeline"
        );

        let (queue, receiver) = create_ingest_queue(self.config.ingest.channel_capacity);
        let ingest_worker = IngestWorker::new(
            receiver,
            self.sink.clone(),
            &self.config.batch,
            self.shutdown_tx.subscribe(),
        )
        .start();

        let (relay_tx, relay_rx) = create_relay(self.config.debounce.relay_capacity);
        let update_listener =
            UpdateListener::new(sources.updates, relay_tx, self.shutdown_tx.subscribe()).start();
        let debouncer = UpdateDebouncer::new(
            relay_rx,
            self.fetcher.clone(),
            &self.config.debounce,
            self.shutdown_tx.subscribe(),
        )
        .start();

        let condition_listener = ConditionChangeListener::new(
            sources.condition_changes,
            self.fetcher.clone(),
            self.shutdown_tx.subscribe(),
        )
        .start();

        self.state = PipelineState::Started {
            queue,
            ingest_worker,
            update_listener,
            debouncer,
            condition_listener,
        };

        Ok(())
    }

    /// Waits for every worker to complete, aggregating their failures.
    ///
    /// The first failing worker triggers a shutdown of the remaining ones, so
    /// a broken pipeline winds down instead of running half-alive.
    pub async fn wait(self) -> AlertResult<()> {
        let PipelineState::Started {
            queue,
            ingest_worker,
            update_listener,
            debouncer,
            condition_listener,
        } = self.state
        else {
            info!("pipeline was not started, nothing to wait for");

            return Ok(());
        };

        // Dropping our copy lets the worker observe a closed channel once
        // every producer clone is gone too.
        drop(queue);

        let mut errors = vec![];

        info!("waiting for ingestion batching worker to complete");
        if let Err(err) = ingest_worker.wait().await {
            errors.push(err);
            let _ = self.shutdown_tx.shutdown();
        }

        info!("waiting for notification listeners to complete");
        if let Err(err) = update_listener.wait().await {
            errors.push(err);
            let _ = self.shutdown_tx.shutdown();
        }
        if let Err(err) = debouncer.wait().await {
            errors.push(err);
            let _ = self.shutdown_tx.shutdown();
        }
        if let Err(err) = condition_listener.wait().await {
            errors.push(err);
            let _ = self.shutdown_tx.shutdown();
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(())
    }

    /// Signals every worker to shut down without waiting for them.
    pub fn shutdown(&self) {
        info!("trying to shut down the alert pipeline");

        if let Err(err) = self.shutdown_tx.shutdown() {
            error!(error = %err, "failed to send shutdown signal to the pipeline");
            return;
        }

        info!("shutdown signal successfully sent to all workers");
    }

    /// Signals shutdown and waits for every worker to complete.
    pub async fn shutdown_and_wait(self) -> AlertResult<()> {
        self.shutdown();
        self.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::memory::MemoryFetcher;
    use crate::notify::source::{MemoryNotificationSource, MemoryNotifier, create_memory_source};
    use crate::sink::memory::MemorySink;
    use crate::types::{ObservationRow, TargetKind};
    use chrono::Utc;

    fn service_config() -> ServiceConfig {
        serde_json::from_str(
            r#"{
                "source": {
                    "host": "localhost",
                    "port": 5432,
                    "name": "postgres",
                    "username": "postgres"
                },
                "batch": { "max_size": 100, "max_fill_ms": 50 },
                "debounce": { "interval_ms": 20 }
            }"#,
        )
        .unwrap()
    }

    fn build_pipeline() -> (
        AlertPipeline<MemorySink, MemoryFetcher, MemoryNotificationSource>,
        MemorySink,
        MemoryFetcher,
        MemoryNotifier,
        MemoryNotifier,
    ) {
        let sink = MemorySink::new();
        let fetcher = MemoryFetcher::new();
        let (update_notifier, updates) = create_memory_source();
        let (condition_notifier, condition_changes) = create_memory_source();

        let pipeline = AlertPipeline::new(
            service_config(),
            sink.clone(),
            fetcher.clone(),
            NotificationSources {
                updates,
                condition_changes,
            },
        );

        (pipeline, sink, fetcher, update_notifier, condition_notifier)
    }

    fn observation() -> ObservationRow {
        ObservationRow {
            condition_id: 1,
            target_id: 7,
            target_kind: TargetKind::Flight,
            is_on: true,
            payload: serde_json::json!({"visibility": 150}),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn pipeline_moves_data_end_to_end() {
        let (mut pipeline, sink, fetcher, update_notifier, condition_notifier) = build_pipeline();
        pipeline.start().unwrap();

        // Batched ingestion path.
        let queue = pipeline.queue().unwrap();
        queue.enqueue(observation()).await.unwrap();
        queue.end_cycle().await.unwrap();
        assert_eq!(sink.batches().await.len(), 1);
        assert_eq!(sink.merge_count().await, 1);

        // Debounced notification path.
        update_notifier.notify(r#"{"ids": [5]}"#).await;
        fetcher.wait_for_fetches(1).await;

        // Immediate condition-change path.
        condition_notifier.notify(r#"{"id": 3, "is_on": true}"#).await;
        fetcher.wait_for_condition_calls(1).await;

        pipeline.shutdown_and_wait().await.unwrap();
    }

    #[tokio::test]
    async fn queue_is_unavailable_before_start() {
        let (pipeline, _sink, _fetcher, _update_notifier, _condition_notifier) = build_pipeline();

        let err = pipeline.queue().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn starting_twice_fails() {
        let (mut pipeline, _sink, _fetcher, _update_notifier, _condition_notifier) =
            build_pipeline();

        pipeline.start().unwrap();
        let err = pipeline.start().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        pipeline.shutdown_and_wait().await.unwrap();
    }
}
