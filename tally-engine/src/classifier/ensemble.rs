//! Classifier ensemble
//!
//! **Protocol:**
//! 1. Providers A and B run concurrently
//! 2. Neither answered: keyword fallback
//! 3. Exactly one answered: its category
//! 4. Both agree: that category, arbiter untouched
//! 5. Disagreement: A wins outright above the confidence shortcut; otherwise
//!    the arbiter decides, with A as the tie-break default when the arbiter
//!    fails or answers outside the label set

use chrono::Utc;
use std::sync::Arc;
use tally_common::config::{EnsembleConfig, ProvidersToml};
use tally_common::events::{EventBus, TallyEvent};
use tally_common::{Category, DecisionPath};
use uuid::Uuid;

use super::fallback::fallback_classify;
use super::providers::{ChatArbiter, ChatProvider, ZeroShotProvider};
use super::{Arbiter, ClassifierProvider, ConsensusResult, Vote};
use crate::config::{ProviderRole, ProviderSettings};

pub struct ClassifierEnsemble {
    provider_a: Arc<dyn ClassifierProvider>,
    provider_b: Arc<dyn ClassifierProvider>,
    arbiter: Arc<dyn Arbiter>,
    confidence_shortcut: f64,
    event_bus: Option<EventBus>,
}

impl ClassifierEnsemble {
    pub fn new(
        provider_a: Arc<dyn ClassifierProvider>,
        provider_b: Arc<dyn ClassifierProvider>,
        arbiter: Arc<dyn Arbiter>,
        config: &EnsembleConfig,
    ) -> Self {
        Self {
            provider_a,
            provider_b,
            arbiter,
            confidence_shortcut: config.confidence_shortcut,
            event_bus: None,
        }
    }

    /// Zero-shot provider A, chat provider B and chat arbiter from config
    pub fn from_config(providers: &ProvidersToml, config: &EnsembleConfig) -> Self {
        let fast = ProviderSettings::resolve(ProviderRole::Fast, providers);
        let thorough = ProviderSettings::resolve(ProviderRole::Thorough, providers);
        let arbiter = ProviderSettings::resolve(ProviderRole::Arbiter, providers);

        for settings in [&fast, &thorough, &arbiter] {
            if settings.is_enabled() {
                tracing::info!(
                    provider = settings.role.as_str(),
                    models = ?settings.models,
                    "Provider enabled"
                );
            } else {
                tracing::warn!(
                    provider = settings.role.as_str(),
                    "Provider disabled (no endpoint or models configured)"
                );
            }
        }

        Self::new(
            Arc::new(ZeroShotProvider::new(&fast)),
            Arc::new(ChatProvider::new(&thorough)),
            Arc::new(ChatArbiter::new(&arbiter)),
            config,
        )
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Classify one document; always resolves to a category
    pub async fn classify(&self, title: &str, content: &str) -> ConsensusResult {
        let decision_id = Uuid::new_v4();

        if title.trim().is_empty() && content.trim().is_empty() {
            tracing::info!(%decision_id, "Empty article, providers skipped");
            let result = decided(Category::GeneralNews, DecisionPath::Fallback, None, None, None);
            self.emit_decision(decision_id, &result);
            return result;
        }

        let (vote_a, vote_b) = tokio::join!(
            self.provider_a.classify(title, content),
            self.provider_b.classify(title, content)
        );

        let result = match (vote_a, vote_b) {
            (None, None) => {
                let category = fallback_classify(title, content);
                tracing::info!(%decision_id, category = %category, "No provider answered, keyword fallback used");
                decided(category, DecisionPath::Fallback, None, None, None)
            }
            (Some(a), None) => {
                tracing::info!(%decision_id, category = %a.category, "Only provider A answered");
                decided(a.category, DecisionPath::Consensus, Some(a), None, None)
            }
            (None, Some(b)) => {
                tracing::info!(%decision_id, category = %b.category, "Only provider B answered");
                decided(b.category, DecisionPath::Consensus, None, Some(b), None)
            }
            (Some(a), Some(b)) if a.category == b.category => {
                tracing::info!(%decision_id, category = %a.category, "Providers agree");
                decided(a.category, DecisionPath::Consensus, Some(a), Some(b), None)
            }
            (Some(a), Some(b)) if a.confidence > self.confidence_shortcut => {
                tracing::info!(
                    %decision_id,
                    category = %a.category,
                    confidence = a.confidence,
                    threshold = self.confidence_shortcut,
                    "Providers disagree, provider A above confidence shortcut"
                );
                decided(a.category, DecisionPath::ConfidenceShortcut, Some(a), Some(b), None)
            }
            (Some(a), Some(b)) => self.arbitrate(decision_id, title, content, a, b).await,
        };

        self.emit_decision(decision_id, &result);
        result
    }

    fn emit_decision(&self, decision_id: Uuid, result: &ConsensusResult) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(TallyEvent::ClassificationDecided {
                decision_id,
                category: result.category,
                decision_path: result.decision_path,
                timestamp: Utc::now(),
            });
        }
    }

    async fn arbitrate(
        &self,
        decision_id: Uuid,
        title: &str,
        content: &str,
        a: Vote,
        b: Vote,
    ) -> ConsensusResult {
        tracing::info!(
            %decision_id,
            a = %a.category,
            a_confidence = a.confidence,
            b = %b.category,
            b_confidence = b.confidence,
            "Providers disagree, consulting arbiter"
        );

        let answer = self.arbiter.arbitrate(title, content, &a, &b).await;
        let validated = answer
            .as_deref()
            .and_then(Category::match_answer)
            .map(|(category, _)| category);

        let category = match validated {
            Some(category) => {
                tracing::info!(%decision_id, category = %category, "Arbiter ruled");
                category
            }
            None => {
                tracing::warn!(
                    %decision_id,
                    answer = ?answer,
                    default = %a.category,
                    "Arbiter gave no valid label, keeping provider A"
                );
                a.category
            }
        };

        decided(category, DecisionPath::Arbitration, Some(a), Some(b), answer)
    }
}

fn decided(
    category: Category,
    decision_path: DecisionPath,
    vote_a: Option<Vote>,
    vote_b: Option<Vote>,
    arbiter_answer: Option<String>,
) -> ConsensusResult {
    ConsensusResult {
        category,
        decision_path,
        vote_a,
        vote_b,
        arbiter_answer,
    }
}
