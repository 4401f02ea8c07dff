//! Concurrency utilities for coordinating the pipeline's workers.
//!
//! The pipeline runs a small fixed set of long-lived tasks (the ingestion
//! batching worker and the notification listeners) plus short-lived fan-out
//! tasks spawned per flush cycle. The primitives here coordinate them:
//!
//! - The [`shutdown`] module implements a broadcast-based shutdown pattern
//!   where a single signal terminates multiple workers, each observing it at
//!   its own suspension points.
//! - The [`signal`] module provides a lightweight unit signal, used to wake
//!   the debouncer loop when a recompute fan-out completes.

pub mod shutdown;
pub mod signal;
