//! Bulk sink abstraction for staged observation rows.

pub mod base;
pub mod memory;

pub use base::StagingSink;
