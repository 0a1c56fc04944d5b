//! OpenAI-compatible chat completion provider and arbiter

use async_trait::async_trait;
use serde_json::{json, Value};
use tally_common::category::LabelMatch;
use tally_common::Category;

use super::HttpTransport;
use crate::classifier::backend_chain::ProviderError;
use crate::classifier::prompts::{classification_prompt, judge_prompt, truncate_input, Prompt};
use crate::classifier::{Arbiter, ClassifierProvider, Vote};
use crate::config::ProviderSettings;

/// Confidence reported for an answer that was exactly a label
pub const EXACT_MATCH_CONFIDENCE: f64 = 0.85;
/// Confidence reported for a label found inside a longer answer
pub const SUBSTRING_MATCH_CONFIDENCE: f64 = 0.70;

/// Chat transport shared by provider and arbiter
struct ChatClient {
    provider_id: String,
    transport: HttpTransport,
    temperature: f32,
    max_tokens: u32,
}

impl ChatClient {
    fn new(settings: &ProviderSettings) -> Self {
        let provider_id = settings.role.as_str().to_string();
        let transport = HttpTransport::new(&provider_id, settings);
        Self {
            provider_id,
            transport,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }

    fn truncate(&self, title: &str, content: &str) -> String {
        truncate_input(title, content, self.transport.max_input_chars())
    }

    /// Walk the model chain until one returns a non-empty answer
    async fn complete(&self, prompt: &Prompt) -> Option<String> {
        if !self.transport.is_enabled() {
            return None;
        }
        self.transport
            .chain()
            .invoke(|model| self.request(model, prompt))
            .await
    }

    async fn request(&self, model: String, prompt: &Prompt) -> Result<String, ProviderError> {
        let endpoint = self
            .transport
            .endpoint()
            .ok_or_else(|| ProviderError::Permanent("no endpoint configured".to_string()))?;

        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self.transport.post_json(endpoint, &body).await?;
        let answer = answer_text(&response)?;

        tracing::debug!(provider = %self.provider_id, model = %model, answer = %answer, "Chat completion answer");
        Ok(answer)
    }
}

/// `choices[0].message.content`, trimmed and lower-cased
fn answer_text(response: &Value) -> Result<String, ProviderError> {
    let content = response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::InvalidResponse("Missing choices[0].message.content".to_string()))?;

    let answer = content.trim().to_lowercase();
    if answer.is_empty() {
        return Err(ProviderError::InvalidResponse("Empty answer".to_string()));
    }
    Ok(answer)
}

/// Provider B: asks a chat model for a single label
pub struct ChatProvider {
    client: ChatClient,
}

impl ChatProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            client: ChatClient::new(settings),
        }
    }
}

#[async_trait]
impl ClassifierProvider for ChatProvider {
    fn provider_id(&self) -> &str {
        &self.client.provider_id
    }

    async fn classify(&self, title: &str, content: &str) -> Option<Vote> {
        let prompt = classification_prompt(&self.client.truncate(title, content));
        let answer = self.client.complete(&prompt).await?;

        match Category::match_answer(&answer) {
            Some((category, matched)) => {
                let confidence = match matched {
                    LabelMatch::Exact => EXACT_MATCH_CONFIDENCE,
                    LabelMatch::Substring => SUBSTRING_MATCH_CONFIDENCE,
                };
                Some(Vote::new(self.client.provider_id.clone(), category, confidence))
            }
            None => {
                tracing::warn!(provider = %self.client.provider_id, answer = %answer, "Answer outside label set");
                None
            }
        }
    }
}

/// Arbiter backed by a chat model and the judge prompt
pub struct ChatArbiter {
    client: ChatClient,
}

impl ChatArbiter {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            client: ChatClient::new(settings),
        }
    }
}

#[async_trait]
impl Arbiter for ChatArbiter {
    async fn arbitrate(
        &self,
        title: &str,
        content: &str,
        vote_a: &Vote,
        vote_b: &Vote,
    ) -> Option<String> {
        let prompt = judge_prompt(&self.client.truncate(title, content), vote_a, vote_b);
        self.client.complete(&prompt).await
    }
}
