//! Simple signaling primitives for worker coordination.
//!
//! Abstracts tokio's watch channels into signal types focused on coordination
//! events rather than data transfer. The pipeline uses them to make "a flush
//! cycle just finished" observable without polling.

use tokio::sync::watch;

/// Transmitter side of a coordination signal channel.
///
/// The signal carries no data payload, it is purely a notification that some
/// event occurred.
pub type SignalTx = watch::Sender<()>;

/// Receiver side of a coordination signal channel.
pub type SignalRx = watch::Receiver<()>;

/// Creates a new coordination signal channel.
///
/// Watch semantics mean bursts of signals sent while the receiver is busy
/// collapse into a single wakeup, which is exactly what coordination events
/// want.
pub fn create_signal() -> (SignalTx, SignalRx) {
    let (tx, rx) = watch::channel(());
    (tx, rx)
}
