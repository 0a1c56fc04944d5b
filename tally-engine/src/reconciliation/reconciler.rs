//! Reconciler service
//!
//! Runs the pure merge against a `FactStore` with optimistic concurrency:
//! read the versioned state, merge, write only if the version is unchanged.
//! A lost race re-reads and re-merges with the same proposal, which is safe
//! because the merge is idempotent.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tally_common::config::ReconciliationConfig;
use tally_common::events::{EventBus, TallyEvent};
use tally_common::{Error, Result};

use super::stat_extractor::{extract_casualty_stats, CasualtyStats};
use super::{merge, FactProposal, MergeOutcome, MergeResult, Merged};
use crate::db::{FactStore, StatsSnapshot, WriteOutcome};

/// Outcome of ingesting one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentIngest {
    pub stats: CasualtyStats,
    pub results: Vec<MergeResult>,
}

pub struct Reconciler {
    store: Arc<dyn FactStore>,
    min_sources: usize,
    max_conflict_retries: u32,
    event_bus: Option<EventBus>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn FactStore>, config: &ReconciliationConfig) -> Self {
        Self {
            store,
            min_sources: config.min_sources_required.max(1),
            max_conflict_retries: config.max_conflict_retries,
            event_bus: None,
        }
    }

    /// Broadcast pending/confirmed/discarded events on `event_bus`
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Merge one proposal into the store
    ///
    /// # Errors
    /// - `InvalidInput` for a blank source id
    /// - `Conflict` when every compare-and-swap attempt lost a race
    /// - store errors, unchanged
    pub async fn merge(&self, proposal: &FactProposal) -> Result<MergeResult> {
        let source_id = proposal.source_id.trim();
        if source_id.is_empty() {
            return Err(Error::InvalidInput("source_id must not be empty".to_string()));
        }
        let metric = proposal.metric;

        let mut conflicts = 0u32;
        loop {
            let current = self.store.read_metric_state(metric).await?;
            let merged = merge(&current.state, proposal.value, source_id, self.min_sources);

            if merged.state == current.state {
                tracing::debug!(
                    metric = %metric,
                    value = proposal.value,
                    source_id,
                    outcome = ?merged.outcome,
                    "Proposal left metric state unchanged"
                );
                self.emit_discarded(proposal, source_id, &merged);
                return Ok(MergeResult::new(metric, &merged));
            }

            match self
                .store
                .write_metric_state(metric, current.version, &merged.state)
                .await?
            {
                WriteOutcome::Written => {
                    self.log_and_emit(proposal, source_id, &merged);
                    return Ok(MergeResult::new(metric, &merged));
                }
                WriteOutcome::Conflict => {
                    conflicts += 1;
                    if conflicts > self.max_conflict_retries {
                        tracing::error!(
                            metric = %metric,
                            source_id,
                            conflicts,
                            "Giving up on merge after repeated store conflicts"
                        );
                        return Err(Error::Conflict(format!(
                            "{} update from {} lost {} compare-and-swap races",
                            metric, source_id, conflicts
                        )));
                    }
                    tracing::debug!(
                        metric = %metric,
                        source_id,
                        attempt = conflicts,
                        "Store conflict, re-reading metric state"
                    );
                }
            }
        }
    }

    /// Extract statistics from a document and merge every positive metric
    pub async fn ingest_document(
        &self,
        source_id: &str,
        title: &str,
        content: &str,
    ) -> Result<DocumentIngest> {
        if source_id.trim().is_empty() {
            return Err(Error::InvalidInput("source_id must not be empty".to_string()));
        }

        let stats = extract_casualty_stats(&format!("{} {}", title, content));
        let mut results = Vec::new();
        for (metric, value) in stats.reported() {
            let proposal = FactProposal::new(metric, value, source_id);
            results.push(self.merge(&proposal).await?);
        }

        tracing::info!(
            source_id,
            found = stats.found,
            merges = results.len(),
            "Document ingested"
        );

        Ok(DocumentIngest { stats, results })
    }

    pub async fn snapshot(&self) -> Result<StatsSnapshot> {
        self.store.snapshot().await
    }

    fn log_and_emit(&self, proposal: &FactProposal, source_id: &str, merged: &Merged) {
        let metric = proposal.metric;
        let now = Utc::now();

        match merged.outcome {
            MergeOutcome::Promoted => {
                tracing::info!(
                    metric = %metric,
                    value = merged.state.confirmed,
                    sources = merged.state.verified_sources.len(),
                    "Metric confirmed"
                );
                self.emit(TallyEvent::MetricConfirmed {
                    metric,
                    value: merged.state.confirmed,
                    verified_sources: merged.state.verified_sources.iter().cloned().collect(),
                    timestamp: now,
                });
            }
            MergeOutcome::PendingCreated | MergeOutcome::PendingUpdated => {
                if let Some(pending) = &merged.state.pending {
                    tracing::info!(
                        metric = %metric,
                        value = pending.value,
                        sources = pending.sources.len(),
                        required = self.min_sources,
                        "Metric pending corroboration"
                    );
                    self.emit(TallyEvent::MetricPending {
                        metric,
                        value: pending.value,
                        sources: pending.sources.iter().cloned().collect(),
                        required_sources: self.min_sources,
                        timestamp: now,
                    });
                }
            }
            MergeOutcome::Corroborated => {
                tracing::debug!(
                    metric = %metric,
                    value = proposal.value,
                    source_id,
                    "Confirmed value corroborated by new source"
                );
            }
            MergeOutcome::Ignored | MergeOutcome::BelowRatchet => {}
        }
    }

    fn emit_discarded(&self, proposal: &FactProposal, source_id: &str, merged: &Merged) {
        if merged.outcome != MergeOutcome::BelowRatchet {
            return;
        }
        tracing::info!(
            metric = %proposal.metric,
            value = proposal.value,
            confirmed = merged.state.confirmed,
            source_id,
            "Proposal below confirmed value discarded"
        );
        self.emit(TallyEvent::ProposalDiscarded {
            metric: proposal.metric,
            value: proposal.value,
            confirmed: merged.state.confirmed,
            source_id: source_id.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn emit(&self, event: TallyEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(event);
        }
    }
}
