//! SQLite-backed fact store
//!
//! One row per metric. Source sets are stored as JSON arrays; the `version`
//! column drives compare-and-swap.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::BTreeSet;
use tally_common::{Error, Metric, Result};

use super::retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use super::{FactStore, StatsSnapshot, VersionedMetricState, WriteOutcome};
use crate::reconciliation::{MetricState, PendingProposal};

pub struct SqliteFactStore {
    pool: SqlitePool,
}

impl SqliteFactStore {
    /// Wrap a pool whose tables were created by `init_tables`
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_db_count(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::InvalidInput(format!("Value {} out of range", value)))
}

fn from_db_count(value: i64, column: &str) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| Error::Internal(format!("Negative {} in metric_state: {}", column, value)))
}

fn parse_sources(json: &str, column: &str) -> Result<BTreeSet<String>> {
    serde_json::from_str(json)
        .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", column, e)))
}

fn row_to_state(row: &SqliteRow) -> Result<VersionedMetricState> {
    let confirmed = from_db_count(row.get("confirmed"), "confirmed")?;
    let verified_sources = parse_sources(row.get("verified_sources"), "verified_sources")?;

    let pending_value: Option<i64> = row.get("pending_value");
    let pending_sources: Option<String> = row.get("pending_sources");
    let pending = match (pending_value, pending_sources) {
        (Some(value), Some(sources)) => Some(PendingProposal {
            value: from_db_count(value, "pending_value")?,
            sources: parse_sources(&sources, "pending_sources")?,
        }),
        _ => None,
    };

    let updated_at: Option<String> = row.get("updated_at");
    let updated_at = updated_at
        .map(|s| DateTime::parse_from_rfc3339(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse updated_at: {}", e)))?
        .map(|dt| dt.with_timezone(&Utc));

    Ok(VersionedMetricState {
        state: MetricState {
            confirmed,
            verified_sources,
            pending,
        },
        version: row.get("version"),
        updated_at,
    })
}

#[async_trait]
impl FactStore for SqliteFactStore {
    async fn read_metric_state(&self, metric: Metric) -> Result<VersionedMetricState> {
        let row = sqlx::query(
            r#"
            SELECT confirmed, verified_sources, pending_value, pending_sources, version, updated_at
            FROM metric_state
            WHERE metric = ?
            "#,
        )
        .bind(metric.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_state(&row),
            None => Err(Error::NotFound(format!("metric_state row for {}", metric))),
        }
    }

    async fn write_metric_state(
        &self,
        metric: Metric,
        expected_version: i64,
        state: &MetricState,
    ) -> Result<WriteOutcome> {
        // Prepare all bind values before touching the pool
        let confirmed = to_db_count(state.confirmed)?;
        let verified_sources = serde_json::to_string(&state.verified_sources)?;
        let pending_value = state
            .pending
            .as_ref()
            .map(|p| to_db_count(p.value))
            .transpose()?;
        let pending_sources = state
            .pending
            .as_ref()
            .map(|p| serde_json::to_string(&p.sources))
            .transpose()?;
        let updated_at = Utc::now().to_rfc3339();

        let rows_affected = retry_on_lock("write_metric_state", DEFAULT_MAX_LOCK_WAIT_MS, || async {
            let result = sqlx::query(
                r#"
                UPDATE metric_state
                SET confirmed = ?,
                    verified_sources = ?,
                    pending_value = ?,
                    pending_sources = ?,
                    version = version + 1,
                    updated_at = ?
                WHERE metric = ? AND version = ?
                "#,
            )
            .bind(confirmed)
            .bind(&verified_sources)
            .bind(pending_value)
            .bind(pending_sources.as_deref())
            .bind(&updated_at)
            .bind(metric.as_str())
            .bind(expected_version)
            .execute(&self.pool)
            .await?;
            Ok::<u64, Error>(result.rows_affected())
        })
        .await?;

        if rows_affected == 0 {
            tracing::debug!(
                metric = %metric,
                expected_version,
                "metric_state version moved, write rejected"
            );
            return Ok(WriteOutcome::Conflict);
        }

        Ok(WriteOutcome::Written)
    }

    async fn snapshot(&self) -> Result<StatsSnapshot> {
        let rows = sqlx::query(
            r#"
            SELECT metric, confirmed, verified_sources, pending_value, pending_sources, version, updated_at
            FROM metric_state
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut states = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.get("metric");
            let metric: Metric = match name.parse() {
                Ok(metric) => metric,
                Err(_) => {
                    tracing::warn!(metric = %name, "Skipping unknown metric row");
                    continue;
                }
            };
            states.push((metric, row_to_state(row)?));
        }

        Ok(StatsSnapshot::from_states(
            states.iter().map(|(metric, state)| (*metric, state)),
        ))
    }
}
