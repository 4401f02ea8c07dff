//! Per-subscription fetch abstraction for the notification path.

pub mod base;
pub mod memory;

pub use base::AlertFetcher;
