use alertflow::alert_error;
use alertflow::error::{AlertResult, ErrorKind};
use alertflow::sink::StagingSink;
use alertflow::types::ObservationRow;
use alertflow_config::shared::StagingConfig;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

/// Staging sink backed by a Postgres staging table and a merge procedure.
///
/// `stage_rows` bulk-appends a batch in a single multi-row insert, so a batch
/// lands atomically: either every row of it is staged or none is.
/// `merge_staged` calls the configured stored procedure, which consumes the
/// staging table and upserts canonical alert state; the procedure is
/// idempotent, calling it with an empty staging table is a no-op.
#[derive(Debug, Clone)]
pub struct PostgresStagingSink {
    pool: PgPool,
    insert_sql: String,
    merge_sql: String,
}

impl PostgresStagingSink {
    pub fn new(pool: PgPool, staging: &StagingConfig) -> Self {
        let insert_sql = format!(
            "INSERT INTO {} (condition_id, target_id, target_type, is_on, payload, received_at) \
             SELECT * FROM unnest($1::bigint[], $2::bigint[], $3::text[], $4::boolean[], $5::jsonb[], $6::timestamptz[])",
            staging.table
        );
        let merge_sql = format!("CALL {}()", staging.merge_procedure);

        Self {
            pool,
            insert_sql,
            merge_sql,
        }
    }
}

impl StagingSink for PostgresStagingSink {
    fn name() -> &'static str {
        "postgres"
    }

    async fn stage_rows(&self, rows: Vec<ObservationRow>) -> AlertResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let row_count = rows.len();
        let mut condition_ids: Vec<i64> = Vec::with_capacity(row_count);
        let mut target_ids: Vec<i64> = Vec::with_capacity(row_count);
        let mut target_kinds: Vec<String> = Vec::with_capacity(row_count);
        let mut is_on_flags: Vec<bool> = Vec::with_capacity(row_count);
        let mut payloads: Vec<serde_json::Value> = Vec::with_capacity(row_count);
        let mut received_ats: Vec<DateTime<Utc>> = Vec::with_capacity(row_count);

        for row in rows {
            condition_ids.push(row.condition_id);
            target_ids.push(row.target_id);
            target_kinds.push(row.target_kind.as_str().to_owned());
            is_on_flags.push(row.is_on);
            payloads.push(row.payload);
            received_ats.push(row.received_at);
        }

        sqlx::query(&self.insert_sql)
            .bind(condition_ids)
            .bind(target_ids)
            .bind(target_kinds)
            .bind(is_on_flags)
            .bind(payloads)
            .bind(received_ats)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                alert_error!(
                    ErrorKind::SinkFailed,
                    "Failed to bulk-append observation rows to the staging table",
                    row_count,
                    source: err
                )
            })?;

        debug!(rows = row_count, "bulk-appended observation rows to the staging table");

        Ok(())
    }

    async fn merge_staged(&self) -> AlertResult<()> {
        sqlx::query(&self.merge_sql)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                alert_error!(
                    ErrorKind::MergeFailed,
                    "Failed to merge staged rows into canonical alert state",
                    source: err
                )
            })?;

        Ok(())
    }
}
