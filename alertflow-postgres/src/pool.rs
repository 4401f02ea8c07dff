use std::time::Duration;

use alertflow::alert_error;
use alertflow::error::{AlertResult, ErrorKind};
use alertflow_config::shared::PgConnectionConfig;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// Default number of connections kept in the pool.
///
/// The pool serves the bulk sink, the fetch fan-out and the loaders; the
/// fan-out concurrency bound keeps demand well below this.
const MAX_CONNECTIONS: u32 = 16;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects a pool to the configured Postgres database.
pub async fn connect_pool(config: &PgConnectionConfig) -> AlertResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(config.with_db())
        .await
        .map_err(|err| {
            alert_error!(
                ErrorKind::SourceConnectionFailed,
                "Failed to connect to the source Postgres database",
                format!("{}:{}/{}", config.host, config.port, config.name),
                source: err
            )
        })?;

    info!(
        host = %config.host,
        port = config.port,
        database = %config.name,
        "connected to source Postgres database"
    );

    Ok(pool)
}
