//! Classifier ensemble
//!
//! Two independent providers vote concurrently; disagreements go to an
//! arbiter; when nobody answers the keyword fallback decides. Classification
//! always ends with exactly one `Category`.
//!
//! Providers share one `BackendChain` for retry, backoff and model
//! substitution, so oracle failures never escape the provider boundary.

pub mod backend_chain;
pub mod ensemble;
pub mod fallback;
pub mod prompts;
pub mod providers;

pub use backend_chain::{BackendChain, ProviderError, RetryPolicy};
pub use ensemble::ClassifierEnsemble;
pub use fallback::fallback_classify;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tally_common::{Category, DecisionPath};

/// One provider's opinion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub provider_id: String,
    pub category: Category,
    /// In [0, 1]
    pub confidence: f64,
}

impl Vote {
    pub fn new(provider_id: impl Into<String>, category: Category, confidence: f64) -> Self {
        Self {
            provider_id: provider_id.into(),
            category,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Final ensemble decision plus the evidence behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub category: Category,
    pub decision_path: DecisionPath,
    pub vote_a: Option<Vote>,
    pub vote_b: Option<Vote>,
    /// Raw arbiter answer, kept even when it failed validation
    pub arbiter_answer: Option<String>,
}

/// A source of classification votes
///
/// Implementations swallow every failure and return `None`.
#[async_trait]
pub trait ClassifierProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    async fn classify(&self, title: &str, content: &str) -> Option<Vote>;
}

/// Tie-breaker consulted when the two providers disagree
///
/// Returns the raw answer text; the ensemble validates it against the label set.
#[async_trait]
pub trait Arbiter: Send + Sync {
    async fn arbitrate(
        &self,
        title: &str,
        content: &str,
        vote_a: &Vote,
        vote_b: &Vote,
    ) -> Option<String>;
}
