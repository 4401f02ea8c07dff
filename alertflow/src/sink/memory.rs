use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;
use tracing::info;

use crate::alert_error;
use crate::error::{AlertResult, ErrorKind};
use crate::sink::base::StagingSink;
use crate::types::ObservationRow;

#[derive(Debug, Default)]
struct Inner {
    batches: Vec<Vec<ObservationRow>>,
    merges: usize,
    fail_next_stages: usize,
}

/// In-memory staging sink for testing and development purposes.
///
/// [`MemorySink`] records every staged batch and merge call, making the
/// batching engine's behavior observable from tests. Staged batches are kept
/// separate rather than concatenated so tests can assert on flush boundaries.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<Inner>>,
    changed: Arc<Notify>,
}

impl MemorySink {
    /// Creates a new empty memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all staged batches, in staging order.
    pub async fn batches(&self) -> Vec<Vec<ObservationRow>> {
        let inner = self.inner.lock().await;
        inner.batches.clone()
    }

    /// Returns how many times [`StagingSink::merge_staged`] was called.
    pub async fn merge_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.merges
    }

    /// Makes the next `count` calls to [`StagingSink::stage_rows`] fail.
    ///
    /// Used to exercise the engine's discard-on-failure behavior.
    pub async fn fail_next_stages(&self, count: usize) {
        let mut inner = self.inner.lock().await;
        inner.fail_next_stages = count;
    }

    /// Waits until at least `count` batches were staged.
    ///
    /// # Panics
    ///
    /// Panics after five seconds to keep hanging tests observable.
    pub async fn wait_for_batches(&self, count: usize) {
        self.wait_for(|inner| inner.batches.len() >= count, "staged batches")
            .await;
    }

    /// Waits until at least `count` merge calls were made.
    ///
    /// # Panics
    ///
    /// Panics after five seconds to keep hanging tests observable.
    pub async fn wait_for_merges(&self, count: usize) {
        self.wait_for(|inner| inner.merges >= count, "merge calls")
            .await;
    }

    async fn wait_for(&self, condition: impl Fn(&Inner) -> bool, what: &str) {
        timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.changed.notified();
                if condition(&*self.inner.lock().await) {
                    return;
                }
                notified.await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
    }
}

impl StagingSink for MemorySink {
    fn name() -> &'static str {
        "memory"
    }

    async fn stage_rows(&self, rows: Vec<ObservationRow>) -> AlertResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.fail_next_stages > 0 {
            inner.fail_next_stages -= 1;
            return Err(alert_error!(
                ErrorKind::SinkFailed,
                "Injected staging failure"
            ));
        }

        info!("staging a batch of {} observation rows", rows.len());
        inner.batches.push(rows);
        drop(inner);
        self.changed.notify_waiters();

        Ok(())
    }

    async fn merge_staged(&self) -> AlertResult<()> {
        let mut inner = self.inner.lock().await;
        inner.merges += 1;
        drop(inner);
        self.changed.notify_waiters();

        Ok(())
    }
}
