use alertflow::alert_error;
use alertflow::error::{AlertResult, ErrorKind};
use alertflow::fetch::AlertFetcher;
use alertflow::types::SubscriptionId;
use sqlx::PgPool;
use tracing::debug;

/// Fetches recomputed alert JSON through database-side aggregation.
///
/// The heavy lifting lives in the database: `get_alerts_json` assembles the
/// full alert document for one subscription, and the condition-change query
/// aggregates the still-active alerts of one condition.
#[derive(Debug, Clone)]
pub struct PostgresAlertFetcher {
    pool: PgPool,
}

/// Aggregates the active alerts of one condition.
///
/// The reported `is_on` value is interpolated before binding: when the
/// condition flipped off, the active alerts are reported with `is_on` set to
/// false so consumers clear them instead of re-showing them.
const CONDITION_ALERTS_QUERY: &str = "\
    SELECT json_agg(json_build_object(
        'alert_id', alert_id,
        'condition_id', condition_id,
        'target_id', target_id,
        'target_type', target_type,
        'payload', payload,
        'updated_at', updated_at,
        'is_on', {reported_is_on}
    ))::text
    FROM user_subscription_alerts
    WHERE user_subscription_condition_id = $1 AND is_on = true";

impl PostgresAlertFetcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AlertFetcher for PostgresAlertFetcher {
    fn name() -> &'static str {
        "postgres"
    }

    async fn fetch_alerts(&self, id: SubscriptionId) -> AlertResult<Option<String>> {
        let alerts: Option<String> = sqlx::query_scalar("SELECT get_alerts_json($1)::text")
            .bind(id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| {
                alert_error!(
                    ErrorKind::SourceQueryFailed,
                    "Failed to fetch alerts for a subscription",
                    id,
                    source: err
                )
            })?;

        debug!(subscription_id = %id, "fetched alerts for subscription");

        Ok(alerts)
    }

    async fn fetch_condition_alerts(
        &self,
        condition_id: i64,
        is_on: bool,
    ) -> AlertResult<Option<String>> {
        let reported_is_on = if is_on { "true" } else { "false" };
        let query = CONDITION_ALERTS_QUERY.replace("{reported_is_on}", reported_is_on);

        let alerts: Option<String> = sqlx::query_scalar(&query)
            .bind(condition_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| {
                alert_error!(
                    ErrorKind::SourceQueryFailed,
                    "Failed to fetch alerts for a condition change",
                    condition_id,
                    source: err
                )
            })?;

        Ok(alerts)
    }
}
