use std::future::Future;

use tokio::sync::mpsc;

use crate::bail;
use crate::error::{AlertResult, ErrorKind};

/// A source of asynchronous change notifications.
///
/// Each received item is the raw textual payload of one notification; parsing
/// is the caller's concern. Implementations are expected to be subscribed to
/// exactly one channel, so payloads arrive already routed.
///
/// `recv` returning an error means the source is broken (e.g. the underlying
/// connection dropped) and the listener driving it should terminate.
pub trait NotificationSource {
    /// The identifier of this source, used mostly for observability.
    fn name() -> &'static str
    where
        Self: Sized;

    /// Waits for and returns the next notification payload.
    fn recv(&mut self) -> impl Future<Output = AlertResult<String>> + Send;
}

/// Pushes payloads into a paired [`MemoryNotificationSource`].
#[derive(Debug, Clone)]
pub struct MemoryNotifier {
    tx: mpsc::Sender<String>,
}

impl MemoryNotifier {
    /// Delivers one notification payload.
    ///
    /// # Panics
    ///
    /// Panics if the paired source was dropped, which in tests means the task
    /// under test exited unexpectedly.
    pub async fn notify(&self, payload: impl Into<String>) {
        self.tx
            .send(payload.into())
            .await
            .expect("notification source was dropped");
    }
}

/// In-memory notification source for testing and development purposes.
///
/// Dropping the paired [`MemoryNotifier`] makes `recv` fail the same way a
/// lost connection would.
#[derive(Debug)]
pub struct MemoryNotificationSource {
    rx: mpsc::Receiver<String>,
}

/// Creates a connected notifier and source pair.
pub fn create_memory_source() -> (MemoryNotifier, MemoryNotificationSource) {
    let (tx, rx) = mpsc::channel(128);

    (MemoryNotifier { tx }, MemoryNotificationSource { rx })
}

impl NotificationSource for MemoryNotificationSource {
    fn name() -> &'static str {
        "memory"
    }

    async fn recv(&mut self) -> AlertResult<String> {
        match self.rx.recv().await {
            Some(payload) => Ok(payload),
            None => bail!(
                ErrorKind::SourceConnectionFailed,
                "Notification source disconnected"
            ),
        }
    }
}
