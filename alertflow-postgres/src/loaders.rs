//! Startup loaders for the read-only reference data of the pipeline.

use alertflow::alert_error;
use alertflow::error::{AlertResult, ErrorKind};
use alertflow::types::{ConditionTemplate, FlightTarget, Subscription, SubscriptionId};
use sqlx::PgPool;
use tracing::info;

#[derive(Debug, sqlx::FromRow)]
struct ConditionTemplateRow {
    id: i64,
    target_type: String,
    threshold: i64,
    name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct FlightTargetRow {
    flight_id: i64,
    source_airport_id: i64,
    destination_airport_id: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: i64,
    name: String,
    view_name: String,
}

/// Loads every condition joined with its template.
///
/// Conditions are loaded once at startup and shared read-only; a change to
/// them requires a restart.
pub async fn load_condition_templates(pool: &PgPool) -> AlertResult<Vec<ConditionTemplate>> {
    let rows: Vec<ConditionTemplateRow> = sqlx::query_as(
        r#"
        select c.id, t.target_type, c.threshold, t.name
        from conditions c
        join condition_templates t on c.template_id = t.id
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|err| {
        alert_error!(
            ErrorKind::SourceQueryFailed,
            "Failed to load condition templates",
            source: err
        )
    })?;

    let templates = rows
        .into_iter()
        .map(|row| {
            Ok(ConditionTemplate {
                id: row.id,
                target_kind: row.target_type.parse()?,
                threshold: row.threshold,
                name: row.name,
            })
        })
        .collect::<AlertResult<Vec<_>>>()?;

    info!(conditions = templates.len(), "loaded condition templates");

    Ok(templates)
}

/// Loads every subscription together with its target-enumerating view name.
pub async fn load_subscriptions(pool: &PgPool) -> AlertResult<Vec<Subscription>> {
    let rows: Vec<SubscriptionRow> =
        sqlx::query_as("select id, name, view_name from subscriptions")
            .fetch_all(pool)
            .await
            .map_err(|err| {
                alert_error!(
                    ErrorKind::SourceQueryFailed,
                    "Failed to load subscriptions",
                    source: err
                )
            })?;

    let subscriptions = rows
        .into_iter()
        .map(|row| Subscription {
            id: SubscriptionId(row.id),
            name: row.name,
            view_name: row.view_name,
        })
        .collect::<Vec<_>>();

    info!(
        subscriptions = subscriptions.len(),
        "loaded subscriptions"
    );

    Ok(subscriptions)
}

/// Loads the flights enumerated by one subscription's view.
///
/// The view name comes from the trusted `subscriptions` table, not from user
/// input, so interpolating it is safe.
pub async fn load_flight_targets(pool: &PgPool, view_name: &str) -> AlertResult<Vec<FlightTarget>> {
    let query = format!(
        "select flight_id, source_airport_id, destination_airport_id from {view_name}"
    );

    let rows: Vec<FlightTargetRow> = sqlx::query_as(&query).fetch_all(pool).await.map_err(|err| {
        alert_error!(
            ErrorKind::SourceQueryFailed,
            "Failed to load flight targets from a subscription view",
            view_name,
            source: err
        )
    })?;

    Ok(rows
        .into_iter()
        .map(|row| FlightTarget {
            flight_id: row.flight_id,
            source_airport_id: row.source_airport_id,
            destination_airport_id: row.destination_airport_id,
        })
        .collect())
}
