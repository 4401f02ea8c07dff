//! Batching worker that turns a stream of observation rows into bulk loads.
//!
//! # Trigger semantics
//!
//! The worker reacts to three trigger classes:
//!
//! 1. **Capacity**: the pending batch reaching `batch.max_size` rows flushes
//!    immediately, staging the rows without merging them. Merging is assumed
//!    expensive relative to a bulk append, so capacity-driven flushes defer
//!    it.
//! 2. **Timer**: every `batch.max_fill_ms` the pending batch is flushed and
//!    everything staged so far is merged.
//! 3. **Sentinel**: an end-of-cycle command flushes, merges, and then acks
//!    the caller's rendezvous, unconditionally. An empty cycle still acks,
//!    otherwise [`IngestQueue::end_cycle`] would deadlock.
//!
//! # Durability
//!
//! Delivery to the sink is at-most-once: a batch whose staging call fails is
//! logged with its size and a sample row, then discarded without retry. On
//! shutdown the worker exits without a final flush, so tail data enqueued
//! after the last flush is lost; producers that need a durability barrier
//! must call [`IngestQueue::end_cycle`] before shutting down.

use std::mem;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info};

use crate::alert_error;
use crate::concurrency::shutdown::ShutdownRx;
use crate::config::BatchConfig;
use crate::error::{AlertResult, ErrorKind};
use crate::sink::base::StagingSink;
use crate::types::ObservationRow;

/// Message consumed by the batching worker.
#[derive(Debug)]
enum IngestCommand {
    /// One observation row to accumulate.
    Row(ObservationRow),
    /// End-of-cycle sentinel carrying the completion rendezvous.
    EndOfCycle(oneshot::Sender<()>),
}

/// Receiving half of the observation channel, consumed by [`IngestWorker`].
#[derive(Debug)]
pub struct IngestReceiver {
    rx: mpsc::Receiver<IngestCommand>,
}

/// Producer-facing handle for the observation channel.
///
/// Cloneable; all clones feed the same worker. The channel is bounded, so
/// [`IngestQueue::enqueue`] blocking once the channel is full is the
/// pipeline's backpressure mechanism.
#[derive(Debug, Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<IngestCommand>,
}

impl IngestQueue {
    /// Enqueues one observation row.
    ///
    /// Suspends while the channel is at capacity. Fails only when the worker
    /// has terminated, which is treated as shutdown.
    pub async fn enqueue(&self, row: ObservationRow) -> AlertResult<()> {
        self.tx
            .send(IngestCommand::Row(row))
            .await
            .map_err(|_| worker_gone())
    }

    /// Signals the end of a production cycle and waits for durability.
    ///
    /// By the time this returns, every row enqueued before the call has
    /// either been staged and merged or had its failure logged. Callers
    /// must not assume durability on a logged failure.
    pub async fn end_cycle(&self) -> AlertResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(IngestCommand::EndOfCycle(ack_tx))
            .await
            .map_err(|_| worker_gone())?;

        ack_rx.await.map_err(|_| worker_gone())
    }
}

fn worker_gone() -> crate::error::AlertError {
    alert_error!(
        ErrorKind::InvalidState,
        "The ingestion batching worker is not running"
    )
}

/// Creates the bounded observation channel.
///
/// `capacity` is the number of in-flight commands after which producers
/// block in [`IngestQueue::enqueue`].
pub fn create_ingest_queue(capacity: usize) -> (IngestQueue, IngestReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (IngestQueue { tx }, IngestReceiver { rx })
}

/// Handle to a running ingestion batching worker.
#[derive(Debug)]
pub struct IngestWorkerHandle {
    join_handle: JoinHandle<AlertResult<()>>,
}

impl IngestWorkerHandle {
    /// Waits for the worker to complete.
    pub async fn wait(self) -> AlertResult<()> {
        match self.join_handle.await {
            Ok(result) => result,
            Err(err) => {
                error!(error = %err, "ingestion batching worker task panicked");
                Err(alert_error!(
                    ErrorKind::IngestWorkerPanic,
                    "The ingestion batching worker panicked",
                    err
                ))
            }
        }
    }
}

/// The single consumer of the observation channel.
///
/// Owns the pending batch exclusively; all external access goes through
/// [`IngestQueue`].
#[derive(Debug)]
pub struct IngestWorker<S> {
    receiver: IngestReceiver,
    sink: S,
    batch_max_size: usize,
    batch_max_fill: Duration,
    shutdown_rx: ShutdownRx,
}

impl<S> IngestWorker<S>
where
    S: StagingSink + Send + Sync + 'static,
{
    /// Creates a new batching worker draining `receiver` into `sink`.
    pub fn new(
        receiver: IngestReceiver,
        sink: S,
        batch_config: &BatchConfig,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            receiver,
            sink,
            batch_max_size: batch_config.max_size,
            batch_max_fill: Duration::from_millis(batch_config.max_fill_ms),
            shutdown_rx,
        }
    }

    /// Starts the worker in a background task.
    pub fn start(self) -> IngestWorkerHandle {
        let join_handle = tokio::spawn(self.run());
        IngestWorkerHandle { join_handle }
    }

    async fn run(mut self) -> AlertResult<()> {
        info!(
            sink = S::name(),
            batch_max_size = self.batch_max_size,
            batch_max_fill_ms = self.batch_max_fill.as_millis() as u64,
            "starting ingestion batching worker"
        );

        let mut pending: Vec<ObservationRow> = Vec::with_capacity(self.batch_max_size);
        // Rows staged but not yet merged. Merge failures keep the count so
        // the next merge trigger retries the call.
        let mut staged_rows: usize = 0;

        let mut flush_interval = interval_at(
            Instant::now() + self.batch_max_fill,
            self.batch_max_fill,
        );
        flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.wait_for_shutdown() => {
                    // Unflushed tail data is acceptable loss here; producers
                    // needing durability call `end_cycle` before shutdown.
                    info!(
                        pending_rows = pending.len(),
                        "shutdown signal received, exiting without a final flush"
                    );
                    return Ok(());
                }

                command = self.receiver.rx.recv() => match command {
                    Some(IngestCommand::Row(row)) => {
                        pending.push(row);

                        if pending.len() >= self.batch_max_size {
                            staged_rows += self.flush(&mut pending).await;
                        }
                    }
                    Some(IngestCommand::EndOfCycle(ack)) => {
                        debug!("end-of-cycle sentinel received");
                        staged_rows += self.flush(&mut pending).await;
                        self.merge(&mut staged_rows, true).await;

                        // The ack must fire even for an empty cycle,
                        // otherwise the caller deadlocks. A dropped receiver
                        // just means the caller stopped waiting.
                        let _ = ack.send(());
                    }
                    None => {
                        info!("observation channel closed, flushing remaining rows and exiting");
                        self.flush(&mut pending).await;
                        return Ok(());
                    }
                },

                _ = flush_interval.tick() => {
                    staged_rows += self.flush(&mut pending).await;
                    self.merge(&mut staged_rows, false).await;
                }
            }
        }
    }

    /// Bulk-appends the pending batch to the sink in one call.
    ///
    /// The pending batch is cleared whether or not the call succeeds; a
    /// failed batch is logged and discarded, never redelivered. Returns the
    /// number of rows staged, zero on an empty batch or a failure.
    async fn flush(&self, pending: &mut Vec<ObservationRow>) -> usize {
        if pending.is_empty() {
            return 0;
        }

        let rows = mem::replace(pending, Vec::with_capacity(self.batch_max_size));
        let row_count = rows.len();
        let sample = rows.first().cloned();
        let started = Instant::now();

        match self.sink.stage_rows(rows).await {
            Ok(()) => {
                info!(
                    rows = row_count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "staged observation batch"
                );
                row_count
            }
            Err(err) => {
                error!(
                    rows = row_count,
                    sample_row = ?sample,
                    error = %err,
                    "failed to stage observation batch, discarding it"
                );
                0
            }
        }
    }

    /// Invokes the sink's idempotent merge of staged rows.
    ///
    /// The timer path skips the call when nothing is staged; the sentinel
    /// path (`force`) always calls it, since merge is contractually a safe
    /// no-op on an empty staging area.
    async fn merge(&self, staged_rows: &mut usize, force: bool) {
        if *staged_rows == 0 && !force {
            return;
        }

        let started = Instant::now();
        match self.sink.merge_staged().await {
            Ok(()) => {
                info!(
                    rows = *staged_rows,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "merged staged rows into canonical state"
                );
                *staged_rows = 0;
            }
            Err(err) => {
                error!(rows = *staged_rows, error = %err, "failed to merge staged rows");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::sink::memory::MemorySink;
    use crate::types::TargetKind;
    use chrono::Utc;
    use tokio::time::{sleep, timeout};

    fn row(condition_id: i64) -> ObservationRow {
        ObservationRow {
            condition_id,
            target_id: 42,
            target_kind: TargetKind::Flight,
            is_on: condition_id % 2 == 0,
            payload: serde_json::json!({"helper": "test"}),
            received_at: Utc::now(),
        }
    }

    fn batch_config(max_size: usize, max_fill_ms: u64) -> BatchConfig {
        BatchConfig {
            max_size,
            max_fill_ms,
        }
    }

    fn start_worker(
        sink: MemorySink,
        config: BatchConfig,
        capacity: usize,
    ) -> (IngestQueue, IngestWorkerHandle, crate::concurrency::shutdown::ShutdownTx) {
        let (queue, receiver) = create_ingest_queue(capacity);
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let handle = IngestWorker::new(receiver, sink, &config, shutdown_rx).start();
        (queue, handle, shutdown_tx)
    }

    #[tokio::test]
    async fn capacity_flush_stages_without_merging() {
        let sink = MemorySink::new();
        let (queue, _handle, _shutdown) =
            start_worker(sink.clone(), batch_config(3, 10_000), 16);

        for id in 0..3 {
            queue.enqueue(row(id)).await.unwrap();
        }

        sink.wait_for_batches(1).await;

        let batches = sink.batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        // The pure capacity path stages data but never merges it.
        assert_eq!(sink.merge_count().await, 0);
    }

    #[tokio::test]
    async fn timer_flush_stages_and_merges() {
        let sink = MemorySink::new();
        let (queue, _handle, _shutdown) =
            start_worker(sink.clone(), batch_config(100, 50), 16);

        queue.enqueue(row(1)).await.unwrap();
        queue.enqueue(row(2)).await.unwrap();

        sink.wait_for_batches(1).await;
        sink.wait_for_merges(1).await;

        let batches = sink.batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[tokio::test]
    async fn end_cycle_returns_after_flush_and_merge() {
        let sink = MemorySink::new();
        let (queue, _handle, _shutdown) =
            start_worker(sink.clone(), batch_config(100, 10_000), 16);

        for id in 0..5 {
            queue.enqueue(row(id)).await.unwrap();
        }
        queue.end_cycle().await.unwrap();

        let batches = sink.batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 5);
        assert_eq!(sink.merge_count().await, 1);
    }

    #[tokio::test]
    async fn empty_end_cycle_still_completes() {
        let sink = MemorySink::new();
        let (queue, _handle, _shutdown) =
            start_worker(sink.clone(), batch_config(100, 10_000), 16);

        timeout(Duration::from_secs(1), queue.end_cycle())
            .await
            .expect("end_cycle must ack even for an empty cycle")
            .unwrap();

        assert!(sink.batches().await.is_empty());
        assert_eq!(sink.merge_count().await, 1);
    }

    #[tokio::test]
    async fn failed_batch_is_discarded_without_redelivery() {
        let sink = MemorySink::new();
        sink.fail_next_stages(1).await;
        let (queue, _handle, _shutdown) =
            start_worker(sink.clone(), batch_config(100, 10_000), 16);

        queue.enqueue(row(1)).await.unwrap();
        queue.enqueue(row(2)).await.unwrap();
        queue.end_cycle().await.unwrap();

        // The failed batch is gone for good.
        assert!(sink.batches().await.is_empty());

        queue.enqueue(row(3)).await.unwrap();
        queue.end_cycle().await.unwrap();

        // Later rows are unaffected by the earlier failure.
        let batches = sink.batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].condition_id, 3);
    }

    #[tokio::test]
    async fn capacity_then_timer_scenario() {
        // Batch capacity 3; A, B, C, D enqueued in immediate succession must
        // produce one capacity flush of [A, B, C] with no merge, then D
        // flushed by the next timer tick together with a merge.
        let sink = MemorySink::new();
        let (queue, _handle, _shutdown) =
            start_worker(sink.clone(), batch_config(3, 100), 16);

        for id in [1, 2, 3, 4] {
            queue.enqueue(row(id)).await.unwrap();
        }

        sink.wait_for_batches(1).await;
        assert_eq!(sink.merge_count().await, 0);

        sink.wait_for_batches(2).await;
        sink.wait_for_merges(1).await;

        let batches = sink.batches().await;
        let first: Vec<i64> = batches[0].iter().map(|r| r.condition_id).collect();
        let second: Vec<i64> = batches[1].iter().map(|r| r.condition_id).collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, vec![4]);
    }

    #[tokio::test]
    async fn enqueue_applies_backpressure_when_channel_is_full() {
        // Worker intentionally not started: the channel fills up.
        let (queue, _receiver) = create_ingest_queue(2);

        queue.enqueue(row(1)).await.unwrap();
        queue.enqueue(row(2)).await.unwrap();

        let blocked = timeout(Duration::from_millis(50), queue.enqueue(row(3))).await;
        assert!(blocked.is_err(), "third enqueue must block on a full channel");
    }

    #[tokio::test]
    async fn shutdown_exits_without_final_flush() {
        let sink = MemorySink::new();
        let (queue, handle, shutdown_tx) =
            start_worker(sink.clone(), batch_config(100, 10_000), 16);

        queue.enqueue(row(1)).await.unwrap();
        queue.enqueue(row(2)).await.unwrap();
        // Give the worker a chance to pull the rows into its pending batch.
        sleep(Duration::from_millis(50)).await;

        shutdown_tx.shutdown().unwrap();
        handle.wait().await.unwrap();

        assert!(sink.batches().await.is_empty());
        assert_eq!(sink.merge_count().await, 0);
    }

    #[tokio::test]
    async fn closed_channel_triggers_final_flush() {
        let sink = MemorySink::new();
        let (queue, handle, _shutdown) =
            start_worker(sink.clone(), batch_config(100, 10_000), 16);

        queue.enqueue(row(1)).await.unwrap();
        queue.enqueue(row(2)).await.unwrap();
        drop(queue);

        handle.wait().await.unwrap();

        let batches = sink.batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(sink.merge_count().await, 0);
    }
}
