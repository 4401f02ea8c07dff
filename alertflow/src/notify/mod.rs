//! The change-notification path.
//!
//! A [`listener`] task subscribes to an asynchronous notification source and
//! relays affected subscription ids into a bounded channel. The
//! [`debouncer`] drains that relay into a deduplicated dirty set and fans out
//! per-key recomputation under a debounce interval and a single-flight
//! guarantee. A second, simpler path ([`condition`]) reacts to condition
//! on/off changes immediately, one event at a time, with no batching.

pub mod condition;
pub mod debouncer;
pub mod events;
pub mod listener;
pub mod source;

use tokio::sync::mpsc;

use crate::types::SubscriptionId;

/// Sending half of the relay between the listener and the debouncer.
pub type RelayTx = mpsc::Sender<SubscriptionId>;

/// Receiving half of the relay between the listener and the debouncer.
pub type RelayRx = mpsc::Receiver<SubscriptionId>;

/// Creates the bounded relay channel carrying dirty subscription ids.
pub fn create_relay(capacity: usize) -> (RelayTx, RelayRx) {
    mpsc::channel(capacity)
}
