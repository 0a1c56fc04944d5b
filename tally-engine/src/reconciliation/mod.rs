//! Quantitative reconciliation
//!
//! Merges numeric fact proposals per metric. A confirmed value is a ratchet:
//! it only moves upward, and only once enough distinct sources agree on a
//! higher value.
//!
//! - `merge`: pure state transition for one proposal
//! - `reconciler`: read / merge / compare-and-swap loop against a `FactStore`
//! - `stat_extractor`: turns document text into per-metric proposals

pub mod merge;
pub mod reconciler;
pub mod stat_extractor;

pub use merge::{merge, Merged};
pub use reconciler::{DocumentIngest, Reconciler};
pub use stat_extractor::{extract_casualty_stats, CasualtyStats};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tally_common::Metric;

/// Candidate value waiting for corroboration (at most one per metric)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingProposal {
    pub value: u64,
    pub sources: BTreeSet<String>,
}

/// Full reconciliation state of one metric
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricState {
    /// Trusted value; non-decreasing
    pub confirmed: u64,
    /// Every source that ever confirmed or corroborated this metric
    pub verified_sources: BTreeSet<String>,
    pub pending: Option<PendingProposal>,
}

/// One observed report of a metric from one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactProposal {
    pub metric: Metric,
    pub value: u64,
    pub source_id: String,
}

impl FactProposal {
    pub fn new(metric: Metric, value: u64, source_id: impl Into<String>) -> Self {
        Self {
            metric,
            value,
            source_id: source_id.into(),
        }
    }
}

/// What a single merge did to the metric state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeOutcome {
    /// Zero reported against an unconfirmed metric: no information
    Ignored,
    /// Matched the confirmed value; source added to verified sources
    Corroborated,
    /// Lower than the confirmed value; discarded
    BelowRatchet,
    /// First report above the confirmed value
    PendingCreated,
    /// Added value and/or source to the existing pending proposal
    PendingUpdated,
    /// Pending proposal reached the source threshold and became confirmed
    Promoted,
}

/// Caller-facing result of a merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub metric: Metric,
    /// True when the proposal is now reflected in the confirmed value
    pub confirmed: bool,
    /// Confirmed value after the merge
    pub value: u64,
    pub verified_sources: Vec<String>,
    pub outcome: MergeOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingProposal>,
}

impl MergeResult {
    pub fn new(metric: Metric, merged: &Merged) -> Self {
        Self {
            metric,
            confirmed: matches!(
                merged.outcome,
                MergeOutcome::Promoted | MergeOutcome::Corroborated
            ),
            value: merged.state.confirmed,
            verified_sources: merged.state.verified_sources.iter().cloned().collect(),
            outcome: merged.outcome,
            pending: merged.state.pending.clone(),
        }
    }
}
