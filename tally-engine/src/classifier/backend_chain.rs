//! Backend chain
//!
//! One logical provider is backed by a priority-ordered list of concrete
//! backends (model identifiers). The chain tries them in order:
//!
//! - transient failure (timeout, 5xx, 429): retry the same backend with
//!   exponential backoff, up to `max_retries`, then move on
//! - permanent failure (retired model, 404/410): move on immediately
//! - invalid response: move on immediately
//!
//! When every backend is exhausted the chain returns `None`. Errors never
//! leave the chain.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single backend call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// Worth retrying; `retry_after` is a server-supplied wait hint
    #[error("transient failure: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Backend retired or unavailable for good
    #[error("backend unavailable: {0}")]
    Permanent(String),

    /// Response did not contain a usable answer
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        ProviderError::Transient {
            message: message.into(),
            retry_after: None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            // Timeouts, connection resets and the like
            ProviderError::transient(err.to_string())
        }
    }
}

/// Retry and substitution policy shared by every provider
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries per backend after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// HTTP statuses meaning "this backend is gone"
    pub permanent_statuses: Vec<u16>,
    /// Give up on the whole provider at the first transient error,
    /// unless the server supplied a short enough wait hint
    pub abandon_on_transient: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            permanent_statuses: vec![404, 410],
            abandon_on_transient: false,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `retry` (1-based): `min(base · 2^(retry-1), max)`
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Server hint wins over computed backoff; both are capped at `max_delay`
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        hint.unwrap_or_else(|| self.backoff_delay(retry))
            .min(self.max_delay)
    }

    /// Map an unsuccessful HTTP status to the error taxonomy
    pub fn classify_status(&self, status: u16, retry_after: Option<Duration>) -> ProviderError {
        if self.permanent_statuses.contains(&status) {
            return ProviderError::Permanent(format!("HTTP {}", status));
        }
        match status {
            408 | 429 | 500..=599 => ProviderError::Transient {
                message: format!("HTTP {}", status),
                retry_after,
            },
            // Remaining 4xx will not get better by retrying the same backend
            _ => ProviderError::Permanent(format!("HTTP {}", status)),
        }
    }
}

/// Ordered backends plus the policy for walking them
#[derive(Debug, Clone)]
pub struct BackendChain {
    provider_id: String,
    backends: Vec<String>,
    policy: RetryPolicy,
}

impl BackendChain {
    pub fn new(provider_id: impl Into<String>, backends: Vec<String>, policy: RetryPolicy) -> Self {
        Self {
            provider_id: provider_id.into(),
            backends,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Run `call` against each backend in priority order until one succeeds
    pub async fn invoke<T, F, Fut>(&self, mut call: F) -> Option<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let provider = self.provider_id.as_str();

        for backend in &self.backends {
            let mut retries = 0u32;

            loop {
                let err = match call(backend.clone()).await {
                    Ok(value) => {
                        if retries > 0 {
                            tracing::debug!(provider, backend = %backend, retries, "Backend succeeded after retry");
                        }
                        return Some(value);
                    }
                    Err(err) => err,
                };

                match err {
                    ProviderError::Permanent(reason) => {
                        tracing::warn!(provider, backend = %backend, reason = %reason, "Backend unavailable, substituting next backend");
                        break;
                    }
                    ProviderError::InvalidResponse(reason) => {
                        tracing::warn!(provider, backend = %backend, reason = %reason, "Backend returned unusable response, substituting next backend");
                        break;
                    }
                    ProviderError::Transient {
                        message,
                        retry_after,
                    } => {
                        let hinted = retry_after.filter(|hint| *hint <= self.policy.max_delay);
                        if self.policy.abandon_on_transient
                            && (hinted.is_none() || retries >= self.policy.max_retries)
                        {
                            tracing::warn!(provider, backend = %backend, reason = %message, "Transient failure, abandoning provider");
                            return None;
                        }

                        if retries >= self.policy.max_retries {
                            tracing::warn!(provider, backend = %backend, retries, reason = %message, "Retries exhausted, substituting next backend");
                            break;
                        }

                        retries += 1;
                        let delay = self.policy.delay_for(retries, retry_after);
                        tracing::warn!(
                            provider,
                            backend = %backend,
                            attempt = retries,
                            delay_ms = delay.as_millis() as u64,
                            reason = %message,
                            "Transient failure, retrying after backoff"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        tracing::warn!(provider, backends = self.backends.len(), "All backends exhausted");
        None
    }
}
