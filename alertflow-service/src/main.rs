//! Alertflow service binary.
//!
//! Wires the batching and notification pipeline to Postgres, optionally runs
//! the built-in mock observation feed, and handles graceful shutdown on
//! sigint/sigterm.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::load_service_config;
use crate::core::start_service;
use crate::error::ServiceResult;

mod config;
mod core;
mod error;
mod mock;

fn main() -> ServiceResult<()> {
    init_tracing();

    let config = load_service_config()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_service(config))
}

/// Initializes structured logging, with log levels configurable through the
/// `RUST_LOG` environment variable.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "alertflow=info,alertflow_postgres=info,alertflow_service=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
