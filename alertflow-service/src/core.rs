use alertflow::pipeline::{AlertPipeline, NotificationSources};
use alertflow_config::shared::ServiceConfig;
use alertflow_postgres::fetch::PostgresAlertFetcher;
use alertflow_postgres::pool::connect_pool;
use alertflow_postgres::sink::PostgresStagingSink;
use alertflow_postgres::source::PostgresNotificationSource;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use crate::error::ServiceResult;
use crate::mock::MockFeed;

/// Starts the alert pipeline against Postgres and runs it to completion.
pub async fn start_service(config: ServiceConfig) -> ServiceResult<()> {
    info!("starting alertflow service");

    let pool = connect_pool(&config.source).await?;

    let sink = PostgresStagingSink::new(pool.clone(), &config.staging);
    let fetcher = PostgresAlertFetcher::new(pool.clone());
    let updates =
        PostgresNotificationSource::connect(&pool, &config.channels.subscription_updates).await?;
    let condition_changes =
        PostgresNotificationSource::connect(&pool, &config.channels.condition_changes).await?;

    let mock_config = config.mock.clone();
    let mut pipeline = AlertPipeline::new(
        config,
        sink,
        fetcher,
        NotificationSources {
            updates,
            condition_changes,
        },
    );
    pipeline.start()?;

    let mock_feed = if mock_config.enabled {
        let feed = MockFeed::new(
            pool,
            pipeline.queue()?,
            &mock_config,
            pipeline.shutdown_tx().subscribe(),
        );
        Some(feed.start())
    } else {
        None
    };

    // Trigger pipeline shutdown on sigint (ctrl+c) or sigterm, the latter
    // being what orchestrators send before killing the process.
    let shutdown_tx = pipeline.shutdown_tx();
    let signal_handle = tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("sigint (ctrl+c) received, shutting down pipeline");
            }
            _ = sigterm.recv() => {
                info!("sigterm received, shutting down pipeline");
            }
        }

        if let Err(err) = shutdown_tx.shutdown() {
            warn!(error = ?err, "failed to send shutdown signal");
            return;
        }

        info!("shutdown signal sent to the pipeline");
    });

    let result = pipeline.wait().await;

    if let Some(mock_feed) = mock_feed {
        if let Err(err) = mock_feed.wait().await {
            warn!(error = %err, "mock feed terminated with an error");
        }
    }

    // The signal task may still be waiting for a signal that never came.
    signal_handle.abort();
    let _ = signal_handle.await;

    result?;

    Ok(())
}
