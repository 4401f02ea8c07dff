//! Configuration objects for the pipeline.
//!
//! This module contains re-exported configurations that are needed by the pipeline.

// Re-exports.
pub use alertflow_config::shared::*;
