//! Fact store
//!
//! Durable per-metric reconciliation state with optimistic concurrency.
//! Every write names the version it was computed from; a write against a
//! stale version reports `WriteOutcome::Conflict` instead of overwriting.

pub mod memory;
pub mod metric_state;
pub mod retry;

pub use memory::MemoryFactStore;
pub use metric_state::SqliteFactStore;
pub use retry::retry_on_lock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tally_common::{Metric, Result};

use crate::reconciliation::{MetricState, PendingProposal};

/// Metric state plus the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedMetricState {
    pub state: MetricState,
    pub version: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Result of a compare-and-swap write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Another writer got there first; re-read and re-merge
    Conflict,
}

/// Storage contract for the reconciler
#[async_trait]
pub trait FactStore: Send + Sync {
    async fn read_metric_state(&self, metric: Metric) -> Result<VersionedMetricState>;

    /// Replace the state only if the stored version still equals `expected_version`
    async fn write_metric_state(
        &self,
        metric: Metric,
        expected_version: i64,
        state: &MetricState,
    ) -> Result<WriteOutcome>;

    /// Aggregate view across all metrics
    async fn snapshot(&self) -> Result<StatsSnapshot>;
}

/// Observability aggregate over all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub casualties: u64,
    pub injured: u64,
    pub missing: u64,
    /// Union of every metric's verified sources, sorted
    pub verified_sources: Vec<String>,
    pub pending_updates: BTreeMap<Metric, PendingProposal>,
    /// Comma-joined `verified_sources`
    pub source: String,
    pub last_updated: Option<DateTime<Utc>>,
}

impl StatsSnapshot {
    pub fn from_states<'a>(
        states: impl IntoIterator<Item = (Metric, &'a VersionedMetricState)>,
    ) -> Self {
        let mut snapshot = StatsSnapshot::default();
        let mut sources = BTreeSet::new();

        for (metric, versioned) in states {
            let state = &versioned.state;
            match metric {
                Metric::Casualties => snapshot.casualties = state.confirmed,
                Metric::Injured => snapshot.injured = state.confirmed,
                Metric::Missing => snapshot.missing = state.confirmed,
            }
            sources.extend(state.verified_sources.iter().cloned());
            if let Some(pending) = &state.pending {
                snapshot.pending_updates.insert(metric, pending.clone());
            }
            snapshot.last_updated = snapshot.last_updated.max(versioned.updated_at);
        }

        snapshot.verified_sources = sources.into_iter().collect();
        snapshot.source = snapshot.verified_sources.join(", ");
        snapshot
    }
}

/// Initialize database connection pool
///
/// Creates the file (and its parent folder) on first use, then the tables.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory pool (each connection would get its own database)
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create the metric_state table and seed one row per metric
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metric_state (
            metric TEXT PRIMARY KEY,
            confirmed INTEGER NOT NULL DEFAULT 0,
            verified_sources TEXT NOT NULL DEFAULT '[]',
            pending_value INTEGER,
            pending_sources TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    for metric in Metric::ALL {
        sqlx::query("INSERT OR IGNORE INTO metric_state (metric) VALUES (?)")
            .bind(metric.as_str())
            .execute(pool)
            .await?;
    }

    tracing::info!("Database tables initialized (metric_state)");

    Ok(())
}
