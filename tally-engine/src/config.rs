//! Provider configuration resolution
//!
//! Layers `[providers.<role>]` TOML overrides over per-role defaults.
//! API keys resolve ENV → TOML.

use std::time::Duration;
use tally_common::config::{ProviderToml, ProvidersToml};
use tracing::{info, warn};

use crate::classifier::RetryPolicy;

const HF_INFERENCE_ENDPOINT: &str = "https://api-inference.huggingface.co/models";
const GROQ_CHAT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";

const CHAT_MODELS: &[&str] = &[
    "llama-3.1-8b-instant",
    "openai/gpt-oss-20b",
    "llama-3.3-70b-versatile",
    "openai/gpt-oss-120b",
];

/// Which ensemble slot a provider fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRole {
    /// Provider A: zero-shot, specialised, short budget
    Fast,
    /// Provider B: chat completion
    Thorough,
    Arbiter,
}

impl ProviderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderRole::Fast => "fast",
            ProviderRole::Thorough => "thorough",
            ProviderRole::Arbiter => "arbiter",
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderRole::Fast => "TALLY_FAST_API_KEY",
            ProviderRole::Thorough => "TALLY_THOROUGH_API_KEY",
            ProviderRole::Arbiter => "TALLY_ARBITER_API_KEY",
        }
    }

    fn toml<'a>(&self, providers: &'a ProvidersToml) -> &'a ProviderToml {
        match self {
            ProviderRole::Fast => &providers.fast,
            ProviderRole::Thorough => &providers.thorough,
            ProviderRole::Arbiter => &providers.arbiter,
        }
    }
}

/// Fully resolved settings for one provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub role: ProviderRole,
    pub endpoint: Option<String>,
    /// Backend chain, highest priority first
    pub models: Vec<String>,
    pub api_key: Option<String>,
    pub policy: RetryPolicy,
    pub timeout: Duration,
    pub requests_per_second: u32,
    pub max_input_chars: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ProviderSettings {
    /// Built-in settings for `role`
    pub fn role_defaults(role: ProviderRole) -> Self {
        let base = Self {
            role,
            endpoint: Some(GROQ_CHAT_ENDPOINT.to_string()),
            models: CHAT_MODELS.iter().map(|m| m.to_string()).collect(),
            api_key: None,
            policy: RetryPolicy::default(),
            timeout: Duration::from_millis(30_000),
            requests_per_second: 3,
            max_input_chars: 2000,
            temperature: 0.3,
            max_tokens: 50,
        };

        match role {
            ProviderRole::Fast => Self {
                endpoint: Some(HF_INFERENCE_ENDPOINT.to_string()),
                models: vec!["facebook/bart-large-mnli".to_string()],
                policy: RetryPolicy {
                    abandon_on_transient: true,
                    max_delay: Duration::from_millis(10_000),
                    ..RetryPolicy::default()
                },
                timeout: Duration::from_millis(15_000),
                max_input_chars: 1000,
                ..base
            },
            ProviderRole::Thorough => base,
            ProviderRole::Arbiter => Self {
                models: CHAT_MODELS[..3].iter().map(|m| m.to_string()).collect(),
                temperature: 0.1,
                ..base
            },
        }
    }

    /// Role defaults overridden by TOML, API key from ENV → TOML
    pub fn resolve(role: ProviderRole, providers: &ProvidersToml) -> Self {
        let toml = role.toml(providers);
        let mut settings = Self::role_defaults(role);

        if let Some(endpoint) = &toml.endpoint {
            settings.endpoint = Some(endpoint.trim_end_matches('/').to_string()).filter(|e| !e.is_empty());
        }
        if let Some(models) = &toml.models {
            settings.models = models
                .iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }
        if let Some(max_retries) = toml.max_retries {
            settings.policy.max_retries = max_retries;
        }
        if let Some(ms) = toml.base_delay_ms {
            settings.policy.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = toml.max_delay_ms {
            settings.policy.max_delay = Duration::from_millis(ms);
        }
        if let Some(statuses) = &toml.permanent_statuses {
            settings.policy.permanent_statuses = statuses.clone();
        }
        if let Some(abandon) = toml.abandon_on_transient {
            settings.policy.abandon_on_transient = abandon;
        }
        if let Some(ms) = toml.timeout_ms {
            settings.timeout = Duration::from_millis(ms);
        }
        if let Some(rps) = toml.requests_per_second {
            settings.requests_per_second = rps;
        }
        if let Some(max_chars) = toml.max_input_chars {
            settings.max_input_chars = max_chars;
        }
        if let Some(temperature) = toml.temperature {
            settings.temperature = temperature;
        }
        if let Some(max_tokens) = toml.max_tokens {
            settings.max_tokens = max_tokens;
        }

        settings.api_key = resolve_api_key(role.api_key_env(), toml.api_key.as_deref());
        if settings.is_enabled() && settings.api_key.is_none() {
            warn!(
                provider = role.as_str(),
                "No API key configured ({} or [providers.{}] api_key); requests are sent unauthenticated",
                role.api_key_env(),
                role.as_str()
            );
        }

        settings
    }

    /// A provider without an endpoint or models never answers
    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some() && !self.models.is_empty()
    }
}

/// Resolve an API key
///
/// **Priority:** ENV → TOML. Whitespace-only keys are skipped.
pub fn resolve_api_key(env_var: &str, toml_key: Option<&str>) -> Option<String> {
    let env_key = std::env::var(env_var).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_key.filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "API key found in both {} and TOML config. Using environment (higher priority).",
            env_var
        );
    }

    if let Some(key) = env_key {
        info!("API key loaded from environment variable {}", env_var);
        return Some(key.trim().to_string());
    }

    toml_key.map(|key| {
        info!("API key for {} loaded from TOML config", env_var);
        key.trim().to_string()
    })
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
