use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::{Instant, sleep, timeout};

use crate::alert_error;
use crate::error::{AlertResult, ErrorKind};
use crate::fetch::base::AlertFetcher;
use crate::types::SubscriptionId;

/// Timing record of one completed [`AlertFetcher::fetch_alerts`] call.
#[derive(Debug, Clone)]
pub struct FetchSpan {
    /// The subscription the call was made for.
    pub id: SubscriptionId,
    /// When the call started.
    pub started: Instant,
    /// When the call finished.
    pub finished: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    spans: Vec<FetchSpan>,
    condition_calls: Vec<(i64, bool)>,
    delay: Duration,
    fail_ids: HashSet<SubscriptionId>,
}

/// In-memory fetcher for testing the notification path.
///
/// Records the start and end instant of every per-key fetch so tests can
/// assert on fan-out membership and on cycle ordering (e.g. that no fetch of
/// a later cycle starts before the previous cycle finished). An optional
/// artificial delay keeps a flush cycle in progress long enough for tests to
/// inject events mid-flight.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    inner: Arc<Mutex<Inner>>,
    completed: Arc<Notify>,
}

impl MemoryFetcher {
    /// Creates a new fetcher that answers immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new fetcher whose per-key calls take `delay` to complete.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                delay,
                ..Inner::default()
            })),
            completed: Arc::new(Notify::new()),
        }
    }

    /// Makes calls for `id` fail with [`ErrorKind::SourceQueryFailed`].
    pub async fn fail_for(&self, id: SubscriptionId) {
        let mut inner = self.inner.lock().await;
        inner.fail_ids.insert(id);
    }

    /// Returns the completed per-key fetch spans, in completion order.
    pub async fn spans(&self) -> Vec<FetchSpan> {
        let inner = self.inner.lock().await;
        inner.spans.clone()
    }

    /// Returns the subscription ids of completed per-key fetches, in
    /// completion order.
    pub async fn fetched_ids(&self) -> Vec<SubscriptionId> {
        let inner = self.inner.lock().await;
        inner.spans.iter().map(|span| span.id).collect()
    }

    /// Returns the recorded immediate-path calls, in completion order.
    pub async fn condition_calls(&self) -> Vec<(i64, bool)> {
        let inner = self.inner.lock().await;
        inner.condition_calls.clone()
    }

    /// Waits until at least `count` per-key fetches completed.
    ///
    /// # Panics
    ///
    /// Panics after five seconds to keep hanging tests observable.
    pub async fn wait_for_fetches(&self, count: usize) {
        timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.completed.notified();
                if self.inner.lock().await.spans.len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for per-key fetches");
    }

    /// Waits until at least `count` immediate-path calls completed.
    ///
    /// # Panics
    ///
    /// Panics after five seconds to keep hanging tests observable.
    pub async fn wait_for_condition_calls(&self, count: usize) {
        timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.completed.notified();
                if self.inner.lock().await.condition_calls.len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for condition-change fetches");
    }
}

impl AlertFetcher for MemoryFetcher {
    fn name() -> &'static str {
        "memory"
    }

    async fn fetch_alerts(&self, id: SubscriptionId) -> AlertResult<Option<String>> {
        let started = Instant::now();
        let (delay, fail) = {
            let inner = self.inner.lock().await;
            (inner.delay, inner.fail_ids.contains(&id))
        };

        if !delay.is_zero() {
            sleep(delay).await;
        }

        let mut inner = self.inner.lock().await;
        inner.spans.push(FetchSpan {
            id,
            started,
            finished: Instant::now(),
        });
        drop(inner);
        self.completed.notify_waiters();

        if fail {
            return Err(alert_error!(
                ErrorKind::SourceQueryFailed,
                "Injected fetch failure",
                id
            ));
        }

        Ok(Some(format!(r#"{{"subscription_id": {id}, "alerts": []}}"#)))
    }

    async fn fetch_condition_alerts(
        &self,
        condition_id: i64,
        is_on: bool,
    ) -> AlertResult<Option<String>> {
        let mut inner = self.inner.lock().await;
        inner.condition_calls.push((condition_id, is_on));
        drop(inner);
        self.completed.notify_waiters();

        Ok(Some(format!(
            r#"{{"condition_id": {condition_id}, "is_on": {is_on}}}"#
        )))
    }
}
