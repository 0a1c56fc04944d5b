//! HTTP classifier providers
//!
//! - `ZeroShotProvider`: Hugging Face style zero-shot inference (provider A)
//! - `ChatProvider`: OpenAI-compatible chat completion (provider B)
//! - `ChatArbiter`: chat completion with the judge prompt
//!
//! All three share `HttpTransport`: rate limiting, timeout, auth header and
//! mapping of HTTP failures onto `ProviderError`.

pub mod chat;
pub mod zero_shot;

pub use chat::{ChatArbiter, ChatProvider};
pub use zero_shot::ZeroShotProvider;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;

use super::backend_chain::{BackendChain, ProviderError, RetryPolicy};
use crate::config::ProviderSettings;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared HTTP plumbing for one provider
pub(crate) struct HttpTransport {
    client: Client,
    rate_limiter: DirectRateLimiter,
    endpoint: Option<String>,
    api_key: Option<String>,
    chain: BackendChain,
    max_input_chars: usize,
}

impl HttpTransport {
    pub(crate) fn new(provider_id: &str, settings: &ProviderSettings) -> Self {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(provider = provider_id, error = %e, "HTTP client build failed, using defaults");
                Client::new()
            });

        let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Self {
            client,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            chain: BackendChain::new(provider_id, settings.models.clone(), settings.policy.clone()),
            max_input_chars: settings.max_input_chars,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.endpoint.is_some() && !self.chain.is_empty()
    }

    pub(crate) fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub(crate) fn chain(&self) -> &BackendChain {
        &self.chain
    }

    pub(crate) fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    /// POST `body` to `url` and return the parsed JSON response
    pub(crate) async fn post_json(&self, url: &str, body: &Value) -> Result<Value, ProviderError> {
        self.rate_limiter.until_ready().await;

        let mut request = self.client.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_seconds);
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(self.chain.policy(), status, retry_after, &body));
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(format!("Unparsable JSON: {}", e)))
    }
}

/// Seconds as sent in `Retry-After` or `estimated_time` (integer or fractional)
fn parse_seconds(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}

/// Map a failed response onto the error taxonomy
///
/// Besides the status code, the body is checked for a retired-model marker
/// (`model_decommissioned`) and a model-loading estimate (`estimated_time`).
pub(crate) fn status_error(
    policy: &RetryPolicy,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderError {
    if body.contains("model_decommissioned") {
        return ProviderError::Permanent(format!("HTTP {}: model decommissioned", status.as_u16()));
    }

    let estimated = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("estimated_time").and_then(Value::as_f64))
        .and_then(|seconds| parse_seconds(&seconds.to_string()));

    match policy.classify_status(status.as_u16(), retry_after.or(estimated)) {
        ProviderError::Transient { message, retry_after } => ProviderError::Transient {
            message: format!("{} {}", message, snippet(body)),
            retry_after,
        },
        other => other,
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}
