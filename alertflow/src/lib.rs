pub mod concurrency;
pub mod config;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod macros;
pub mod notify;
pub mod pipeline;
pub mod sink;
pub mod types;
