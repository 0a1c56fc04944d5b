//! In-memory fact store
//!
//! Same compare-and-swap contract as the SQLite store, without durability.
//! Used by tests and `serve --memory`.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tally_common::{Metric, Result};
use tokio::sync::RwLock;

use super::{FactStore, StatsSnapshot, VersionedMetricState, WriteOutcome};
use crate::reconciliation::MetricState;

pub struct MemoryFactStore {
    metrics: RwLock<HashMap<Metric, VersionedMetricState>>,
}

impl MemoryFactStore {
    pub fn new() -> Self {
        let metrics = Metric::ALL
            .iter()
            .map(|metric| {
                (
                    *metric,
                    VersionedMetricState {
                        state: MetricState::default(),
                        version: 0,
                        updated_at: None,
                    },
                )
            })
            .collect();
        Self {
            metrics: RwLock::new(metrics),
        }
    }
}

impl Default for MemoryFactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FactStore for MemoryFactStore {
    async fn read_metric_state(&self, metric: Metric) -> Result<VersionedMetricState> {
        let metrics = self.metrics.read().await;
        Ok(metrics.get(&metric).cloned().unwrap_or(VersionedMetricState {
            state: MetricState::default(),
            version: 0,
            updated_at: None,
        }))
    }

    async fn write_metric_state(
        &self,
        metric: Metric,
        expected_version: i64,
        state: &MetricState,
    ) -> Result<WriteOutcome> {
        let mut metrics = self.metrics.write().await;
        let entry = metrics.entry(metric).or_insert_with(|| VersionedMetricState {
            state: MetricState::default(),
            version: 0,
            updated_at: None,
        });

        if entry.version != expected_version {
            return Ok(WriteOutcome::Conflict);
        }

        entry.state = state.clone();
        entry.version += 1;
        entry.updated_at = Some(Utc::now());
        Ok(WriteOutcome::Written)
    }

    async fn snapshot(&self) -> Result<StatsSnapshot> {
        let metrics = self.metrics.read().await;
        Ok(StatsSnapshot::from_states(
            Metric::ALL
                .iter()
                .filter_map(|metric| metrics.get(metric).map(|state| (*metric, state))),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_starts_at_zero() {
        let store = MemoryFactStore::new();
        let current = store.read_metric_state(Metric::Missing).await.unwrap();
        assert_eq!(current.version, 0);
        assert_eq!(current.state, MetricState::default());
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = MemoryFactStore::new();
        let state = MetricState {
            confirmed: 4,
            ..Default::default()
        };

        let first = store
            .write_metric_state(Metric::Injured, 0, &state)
            .await
            .unwrap();
        assert_eq!(first, WriteOutcome::Written);

        let stale = store
            .write_metric_state(Metric::Injured, 0, &MetricState::default())
            .await
            .unwrap();
        assert_eq!(stale, WriteOutcome::Conflict);

        let current = store.read_metric_state(Metric::Injured).await.unwrap();
        assert_eq!(current.version, 1);
        assert_eq!(current.state.confirmed, 4);
        assert!(current.updated_at.is_some());
    }
}
