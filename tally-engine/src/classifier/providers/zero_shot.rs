//! Zero-shot inference provider
//!
//! Posts `{inputs, parameters: {candidate_labels, multi_label}}` to
//! `<endpoint>/<model>` and takes the top-scored label. Specialised and
//! cheap, so it runs on a short budget: truncated input and immediate
//! abandonment on transient errors unless the server says the model is
//! loading.

use async_trait::async_trait;
use serde_json::{json, Value};
use tally_common::Category;

use super::HttpTransport;
use crate::classifier::backend_chain::ProviderError;
use crate::classifier::prompts::truncate_input;
use crate::classifier::{ClassifierProvider, Vote};
use crate::config::ProviderSettings;

pub struct ZeroShotProvider {
    provider_id: String,
    transport: HttpTransport,
}

impl ZeroShotProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        let provider_id = settings.role.as_str().to_string();
        let transport = HttpTransport::new(&provider_id, settings);
        Self {
            provider_id,
            transport,
        }
    }

    async fn request(&self, model: String, text: &str) -> Result<Vote, ProviderError> {
        let endpoint = self
            .transport
            .endpoint()
            .ok_or_else(|| ProviderError::Permanent("no endpoint configured".to_string()))?;
        let url = format!("{}/{}", endpoint, model);

        let labels: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        let body = json!({
            "inputs": text,
            "parameters": {
                "candidate_labels": labels,
                "multi_label": false,
            },
        });

        let response = self.transport.post_json(&url, &body).await?;
        let (label, score) = top_label(&response)?;

        let category: Category = label
            .parse()
            .map_err(|_| ProviderError::InvalidResponse(format!("Unknown label: {}", label)))?;

        tracing::debug!(
            provider = %self.provider_id,
            model = %model,
            category = %category,
            confidence = score,
            "Zero-shot classification"
        );

        Ok(Vote::new(self.provider_id.clone(), category, score))
    }
}

/// Highest-scoring `(label, score)` from either response shape:
/// `{labels: [...], scores: [...]}` or `[{label, score}, ...]`
fn top_label(response: &Value) -> Result<(String, f64), ProviderError> {
    if let Some(error) = response.get("error") {
        return Err(ProviderError::InvalidResponse(format!("Error payload: {}", error)));
    }

    let pairs: Vec<(String, f64)> = match response {
        Value::Object(_) => {
            let labels = response.get("labels").and_then(Value::as_array);
            let scores = response.get("scores").and_then(Value::as_array);
            match (labels, scores) {
                (Some(labels), Some(scores)) => labels
                    .iter()
                    .zip(scores)
                    .filter_map(|(l, s)| Some((l.as_str()?.to_string(), s.as_f64()?)))
                    .collect(),
                _ => Vec::new(),
            }
        }
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                Some((
                    item.get("label")?.as_str()?.to_string(),
                    item.get("score")?.as_f64()?,
                ))
            })
            .collect(),
        _ => Vec::new(),
    };

    pairs
        .into_iter()
        .filter(|(_, score)| score.is_finite())
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .ok_or_else(|| ProviderError::InvalidResponse("No labels/scores in response".to_string()))
}

#[async_trait]
impl ClassifierProvider for ZeroShotProvider {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn classify(&self, title: &str, content: &str) -> Option<Vote> {
        if !self.transport.is_enabled() {
            return None;
        }
        let text = truncate_input(title, content, self.transport.max_input_chars());
        self.transport
            .chain()
            .invoke(|model| self.request(model, &text))
            .await
    }
}
