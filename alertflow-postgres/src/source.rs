use alertflow::alert_error;
use alertflow::error::{AlertResult, ErrorKind};
use alertflow::notify::source::NotificationSource;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tracing::info;

/// Notification source backed by Postgres LISTEN/NOTIFY.
///
/// Each instance holds its own dedicated listening connection and is
/// subscribed to exactly one channel. Reconnection is not attempted; a lost
/// connection surfaces as a `recv` error and terminates the listener driving
/// this source.
#[derive(Debug)]
pub struct PostgresNotificationSource {
    listener: PgListener,
    channel: String,
}

impl PostgresNotificationSource {
    /// Connects a dedicated listening connection and subscribes it to
    /// `channel`.
    pub async fn connect(pool: &PgPool, channel: &str) -> AlertResult<Self> {
        let mut listener = PgListener::connect_with(pool).await.map_err(|err| {
            alert_error!(
                ErrorKind::SourceConnectionFailed,
                "Failed to open a listening connection",
                channel,
                source: err
            )
        })?;

        listener.listen(channel).await.map_err(|err| {
            alert_error!(
                ErrorKind::SourceConnectionFailed,
                "Failed to subscribe to a notification channel",
                channel,
                source: err
            )
        })?;

        info!(channel, "listening for notifications");

        Ok(Self {
            listener,
            channel: channel.to_owned(),
        })
    }
}

impl NotificationSource for PostgresNotificationSource {
    fn name() -> &'static str {
        "postgres"
    }

    async fn recv(&mut self) -> AlertResult<String> {
        // `recv` (unlike `try_recv`) transparently reconnects, which would
        // silently drop notifications sent while the connection was down, so
        // we use the non-resuming variant and treat a lost connection as
        // fatal.
        match self.listener.try_recv().await {
            Ok(Some(notification)) => Ok(notification.payload().to_owned()),
            Ok(None) => Err(alert_error!(
                ErrorKind::SourceConnectionFailed,
                "The listening connection was lost",
                self.channel
            )),
            Err(err) => Err(alert_error!(
                ErrorKind::SourceConnectionFailed,
                "Failed to receive a notification",
                self.channel,
                source: err
            )),
        }
    }
}
