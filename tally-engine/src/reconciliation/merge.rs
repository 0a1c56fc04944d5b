//! Pure metric merge
//!
//! `merge` never touches storage; the reconciler wraps it in a
//! compare-and-swap loop. Given the same state and proposal it always
//! produces the same result, which makes replayed proposals harmless.

use super::{MergeOutcome, MetricState, PendingProposal};
use std::collections::BTreeSet;

/// New state plus what happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub state: MetricState,
    pub outcome: MergeOutcome,
}

/// Apply one `(value, source_id)` report to `current`
///
/// **Rules:**
/// - `value == confirmed`: corroboration (no information when both are zero)
/// - `value < confirmed`: discarded, the confirmed value never decreases
/// - `value > confirmed`: merged into the pending proposal, keeping the larger
///   of the two values and the union of sources; promoted once the source set
///   reaches `min_sources`
///
/// A report smaller than the pending value still counts toward the pending
/// value's source threshold.
pub fn merge(current: &MetricState, value: u64, source_id: &str, min_sources: usize) -> Merged {
    if value == current.confirmed {
        if value == 0 {
            return unchanged(current, MergeOutcome::Ignored);
        }
        let mut state = current.clone();
        state.verified_sources.insert(source_id.to_string());
        return Merged {
            state,
            outcome: MergeOutcome::Corroborated,
        };
    }

    if value < current.confirmed {
        return unchanged(current, MergeOutcome::BelowRatchet);
    }

    let (candidate, outcome) = match &current.pending {
        None => (
            PendingProposal {
                value,
                sources: BTreeSet::from([source_id.to_string()]),
            },
            MergeOutcome::PendingCreated,
        ),
        Some(pending) => {
            let mut sources = pending.sources.clone();
            sources.insert(source_id.to_string());
            (
                PendingProposal {
                    value: value.max(pending.value),
                    sources,
                },
                MergeOutcome::PendingUpdated,
            )
        }
    };

    if candidate.sources.len() >= min_sources {
        let mut verified_sources = current.verified_sources.clone();
        verified_sources.extend(candidate.sources);
        return Merged {
            state: MetricState {
                confirmed: candidate.value,
                verified_sources,
                pending: None,
            },
            outcome: MergeOutcome::Promoted,
        };
    }

    Merged {
        state: MetricState {
            confirmed: current.confirmed,
            verified_sources: current.verified_sources.clone(),
            pending: Some(candidate),
        },
        outcome,
    }
}

fn unchanged(current: &MetricState, outcome: MergeOutcome) -> Merged {
    Merged {
        state: current.clone(),
        outcome,
    }
}
