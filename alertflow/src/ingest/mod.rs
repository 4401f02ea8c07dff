//! The ingestion batching engine.
//!
//! Producers push observation rows into a bounded channel; a single consumer
//! worker accumulates them into a pending batch and decides, under competing
//! triggers (capacity, timer, end-of-cycle sentinel), when to bulk-load and
//! merge them. See [`batcher`] for the trigger and durability semantics.

pub mod batcher;

pub use batcher::{IngestQueue, IngestWorker, IngestWorkerHandle, create_ingest_queue};
