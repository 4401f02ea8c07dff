//! Debounced fan-out of per-subscription recomputation.
//!
//! The debouncer drains the dirty-key relay into a deduplicated set and
//! periodically flushes it: the whole set is taken at once and recomputed
//! concurrently, one fetch per key, bounded by a semaphore.
//!
//! # Flush discipline
//!
//! - At most one flush cycle runs at any time.
//! - A flush may only start once the debounce interval has elapsed since the
//!   *end* of the previous flush, so back-to-back cycles always leave a quiet
//!   gap regardless of how long a cycle takes.
//! - Keys marked dirty while a flush is running land in the set for the next
//!   cycle; they are never lost and never joined into the running cycle.
//!
//! The loop is fully event-driven: it suspends on the relay, the shutdown
//! signal, the debounce deadline and the flush-completion signal, and never
//! polls.

use std::collections::HashSet;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::concurrency::signal::{SignalTx, create_signal};
use crate::config::DebounceConfig;
use crate::error::AlertResult;
use crate::fetch::base::AlertFetcher;
use crate::notify::RelayRx;
use crate::notify::listener::ListenerHandle;
use crate::types::SubscriptionId;

/// Shared flush bookkeeping between the debouncer loop and the fan-out task.
#[derive(Debug)]
struct FlushState {
    in_progress: bool,
    /// When the previous flush cycle ended. The debounce interval is measured
    /// from here, not from when the cycle started.
    last_finished: Instant,
}

/// Debounces dirty subscription ids and fans out their recomputation.
#[derive(Debug)]
pub struct UpdateDebouncer<F> {
    relay_rx: RelayRx,
    fetcher: F,
    interval: Duration,
    max_concurrent_fetches: usize,
    shutdown_rx: ShutdownRx,
}

impl<F> UpdateDebouncer<F>
where
    F: AlertFetcher + Clone + Send + Sync + 'static,
{
    pub fn new(
        relay_rx: RelayRx,
        fetcher: F,
        debounce_config: &DebounceConfig,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            relay_rx,
            fetcher,
            interval: Duration::from_millis(debounce_config.interval_ms),
            max_concurrent_fetches: debounce_config.max_concurrent_fetches,
            shutdown_rx,
        }
    }

    /// Starts the debouncer in a background task.
    pub fn start(self) -> ListenerHandle {
        ListenerHandle::new("update-debouncer", tokio::spawn(self.run()))
    }

    async fn run(mut self) -> AlertResult<()> {
        info!(
            fetcher = F::name(),
            interval_ms = self.interval.as_millis() as u64,
            max_concurrent_fetches = self.max_concurrent_fetches,
            "starting update debouncer"
        );

        let mut dirty: HashSet<SubscriptionId> = HashSet::new();
        let flush_state = Arc::new(Mutex::new(FlushState {
            in_progress: false,
            last_finished: Instant::now(),
        }));
        let (flush_done_tx, mut flush_done_rx) = create_signal();
        let fetch_permits = Arc::new(Semaphore::new(self.max_concurrent_fetches));

        loop {
            let (flush_in_progress, deadline) = {
                let state = flush_state.lock().await;
                (state.in_progress, state.last_finished + self.interval)
            };

            tokio::select! {
                _ = self.shutdown_rx.wait_for_shutdown() => {
                    // A running fan-out cycle is left to finish on its own.
                    info!(
                        pending_keys = dirty.len(),
                        "shutdown signal received, stopping update debouncer"
                    );
                    return Ok(());
                }

                id = self.relay_rx.recv() => match id {
                    Some(id) => {
                        dirty.insert(id);
                    }
                    None => {
                        info!("dirty-key relay closed, stopping update debouncer");
                        return Ok(());
                    }
                },

                // A finished flush re-arms the debounce deadline below.
                _ = flush_done_rx.changed(), if flush_in_progress => {}

                _ = sleep_until(deadline), if !dirty.is_empty() && !flush_in_progress => {
                    // Only this task starts flushes, so the snapshot taken
                    // above cannot have gone stale.
                    let keys = mem::take(&mut dirty);
                    flush_state.lock().await.in_progress = true;

                    info!(
                        subscriptions = keys.len(),
                        "debounce interval elapsed, starting recompute fan-out"
                    );

                    tokio::spawn(run_fanout(
                        keys,
                        self.fetcher.clone(),
                        fetch_permits.clone(),
                        flush_state.clone(),
                        flush_done_tx.clone(),
                    ));
                }
            }
        }
    }
}

/// Recomputes every key of one flush cycle, then stamps the cycle's end.
///
/// Per-key failures are logged and do not affect the other keys or the
/// debouncer itself.
async fn run_fanout<F>(
    keys: HashSet<SubscriptionId>,
    fetcher: F,
    fetch_permits: Arc<Semaphore>,
    flush_state: Arc<Mutex<FlushState>>,
    flush_done_tx: SignalTx,
) where
    F: AlertFetcher + Clone + Send + Sync + 'static,
{
    let started = Instant::now();
    let key_count = keys.len();

    let mut fetches = JoinSet::new();
    for id in keys {
        let fetcher = fetcher.clone();
        let fetch_permits = fetch_permits.clone();

        fetches.spawn(async move {
            let Ok(_permit) = fetch_permits.acquire_owned().await else {
                return;
            };

            match fetcher.fetch_alerts(id).await {
                Ok(Some(alerts)) => {
                    debug!(
                        subscription_id = %id,
                        bytes = alerts.len(),
                        "recomputed alerts for subscription"
                    );
                }
                Ok(None) => {
                    debug!(subscription_id = %id, "no alerts for subscription");
                }
                Err(err) => {
                    warn!(
                        subscription_id = %id,
                        error = %err,
                        "failed to recompute alerts for subscription"
                    );
                }
            }
        });
    }
    while fetches.join_next().await.is_some() {}

    let elapsed = started.elapsed();
    info!(
        subscriptions = key_count,
        elapsed_ms = elapsed.as_millis() as u64,
        per_second = (key_count as f64 / elapsed.as_secs_f64().max(0.001)) as u64,
        "completed recompute fan-out"
    );

    {
        let mut state = flush_state.lock().await;
        state.in_progress = false;
        state.last_finished = Instant::now();
    }
    // A dropped receiver means the debouncer already exited.
    let _ = flush_done_tx.send(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
    use crate::fetch::memory::{FetchSpan, MemoryFetcher};
    use crate::notify::{RelayTx, create_relay};
    use tokio::time::sleep;

    fn debounce_config(interval_ms: u64, max_concurrent_fetches: usize) -> DebounceConfig {
        DebounceConfig {
            interval_ms,
            relay_capacity: 64,
            max_concurrent_fetches,
        }
    }

    fn start_debouncer(
        fetcher: MemoryFetcher,
        config: DebounceConfig,
    ) -> (RelayTx, ListenerHandle, ShutdownTx) {
        let (relay_tx, relay_rx) = create_relay(config.relay_capacity);
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let handle = UpdateDebouncer::new(relay_rx, fetcher, &config, shutdown_rx).start();
        (relay_tx, handle, shutdown_tx)
    }

    async fn mark(relay_tx: &RelayTx, ids: &[i64]) {
        for id in ids {
            relay_tx.send(SubscriptionId(*id)).await.unwrap();
        }
    }

    fn ids_of(spans: &[FetchSpan]) -> HashSet<SubscriptionId> {
        spans.iter().map(|span| span.id).collect()
    }

    #[tokio::test]
    async fn repeated_marks_collapse_into_one_fetch() {
        let fetcher = MemoryFetcher::new();
        let (relay_tx, _handle, _shutdown) =
            start_debouncer(fetcher.clone(), debounce_config(30, 8));

        mark(&relay_tx, &[5, 5, 5]).await;
        fetcher.wait_for_fetches(1).await;

        // No further cycles may appear for the triplicate marks.
        sleep(Duration::from_millis(150)).await;
        assert_eq!(fetcher.fetched_ids().await, vec![SubscriptionId(5)]);
    }

    #[tokio::test]
    async fn bursts_within_the_interval_flush_as_one_cycle() {
        let fetcher = MemoryFetcher::new();
        let (relay_tx, _handle, _shutdown) =
            start_debouncer(fetcher.clone(), debounce_config(200, 8));

        mark(&relay_tx, &[1, 2]).await;
        sleep(Duration::from_millis(50)).await;
        mark(&relay_tx, &[3]).await;

        fetcher.wait_for_fetches(3).await;

        let spans = fetcher.spans().await;
        assert_eq!(ids_of(&spans), HashSet::from([1, 2, 3].map(SubscriptionId)));

        // A second cycle could only have started a full interval after the
        // first one finished; everything starting earlier proves the bursts
        // were coalesced.
        let first_finished = spans.iter().map(|span| span.finished).min().unwrap();
        for span in &spans {
            assert!(span.started < first_finished + Duration::from_millis(200));
        }
    }

    #[tokio::test]
    async fn keys_marked_mid_flush_run_in_the_next_cycle() {
        let fetcher = MemoryFetcher::with_delay(Duration::from_millis(150));
        let (relay_tx, _handle, _shutdown) =
            start_debouncer(fetcher.clone(), debounce_config(20, 8));

        mark(&relay_tx, &[5, 7]).await;
        // Let the first cycle begin, then dirty two keys mid-flight.
        sleep(Duration::from_millis(80)).await;
        mark(&relay_tx, &[5, 9]).await;

        fetcher.wait_for_fetches(4).await;

        let spans = fetcher.spans().await;
        assert_eq!(ids_of(&spans[..2]), HashSet::from([5, 7].map(SubscriptionId)));
        assert_eq!(ids_of(&spans[2..]), HashSet::from([5, 9].map(SubscriptionId)));

        // Single flight: the second cycle must not start before every fetch
        // of the first cycle finished.
        let first_cycle_end = spans[..2].iter().map(|span| span.finished).max().unwrap();
        let second_cycle_start = spans[2..].iter().map(|span| span.started).min().unwrap();
        assert!(second_cycle_start >= first_cycle_end);
    }

    #[tokio::test]
    async fn next_cycle_waits_a_full_interval_after_the_previous_flush_ends() {
        let fetcher = MemoryFetcher::with_delay(Duration::from_millis(100));
        let (relay_tx, _handle, _shutdown) =
            start_debouncer(fetcher.clone(), debounce_config(80, 8));

        mark(&relay_tx, &[1]).await;
        sleep(Duration::from_millis(120)).await;
        // The first cycle is still fetching; this key waits for the next one.
        mark(&relay_tx, &[2]).await;

        fetcher.wait_for_fetches(2).await;

        // The interval is measured from the end of the previous flush, so the
        // gap between cycles is at least one full interval.
        let spans = fetcher.spans().await;
        let gap = spans[1].started.duration_since(spans[0].finished);
        assert!(gap >= Duration::from_millis(80), "cycle gap was {gap:?}");
    }

    #[tokio::test]
    async fn per_key_failure_does_not_poison_the_cycle() {
        let fetcher = MemoryFetcher::new();
        fetcher.fail_for(SubscriptionId(7)).await;
        let (relay_tx, _handle, _shutdown) =
            start_debouncer(fetcher.clone(), debounce_config(30, 8));

        mark(&relay_tx, &[5, 7, 9]).await;
        fetcher.wait_for_fetches(3).await;

        let spans = fetcher.spans().await;
        assert_eq!(ids_of(&spans), HashSet::from([5, 7, 9].map(SubscriptionId)));

        // The debouncer survives the failure and keeps flushing.
        mark(&relay_tx, &[11]).await;
        fetcher.wait_for_fetches(4).await;
    }

    #[tokio::test]
    async fn fanout_concurrency_is_bounded() {
        let fetcher = MemoryFetcher::with_delay(Duration::from_millis(50));
        let (relay_tx, _handle, _shutdown) =
            start_debouncer(fetcher.clone(), debounce_config(20, 2));

        mark(&relay_tx, &[1, 2, 3, 4]).await;
        fetcher.wait_for_fetches(4).await;

        let spans = fetcher.spans().await;
        for span in &spans {
            let overlapping = spans
                .iter()
                .filter(|other| other.started < span.finished && other.finished > span.started)
                .count();
            assert!(overlapping <= 2, "{overlapping} fetches ran concurrently");
        }
    }

    #[tokio::test]
    async fn shutdown_stops_the_debouncer() {
        let fetcher = MemoryFetcher::new();
        let (_relay_tx, handle, shutdown_tx) =
            start_debouncer(fetcher.clone(), debounce_config(30, 8));

        shutdown_tx.shutdown().unwrap();
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn closed_relay_stops_the_debouncer() {
        let fetcher = MemoryFetcher::new();
        let (relay_tx, handle, _shutdown) =
            start_debouncer(fetcher.clone(), debounce_config(30, 8));

        drop(relay_tx);
        handle.wait().await.unwrap();
    }
}
