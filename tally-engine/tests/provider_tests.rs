//! HTTP provider tests against a scripted local upstream
//!
//! The upstream serves both the zero-shot (`/models/<model>`) and the chat
//! completion (`/v1/chat`) shapes and answers from a per-model script.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tally_common::config::{EnsembleConfig, ProviderToml, ProvidersToml};
use tally_common::{Category, DecisionPath};
use tally_engine::classifier::providers::{ChatArbiter, ChatProvider, ZeroShotProvider};
use tally_engine::classifier::{Arbiter, ClassifierEnsemble, ClassifierProvider, Vote};
use tally_engine::config::{ProviderRole, ProviderSettings};

const ZERO_SHOT_MODEL: &str = "facebook/bart-large-mnli";

#[derive(Clone)]
struct Reply {
    status: u16,
    body: Value,
    retry_after: Option<&'static str>,
}

impl Reply {
    fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body,
            retry_after: None,
        }
    }

    fn chat(answer: &str) -> Self {
        Self::ok(json!({
            "choices": [{"message": {"role": "assistant", "content": answer}}]
        }))
    }

    fn status(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            retry_after: None,
        }
    }
}

/// Scripted upstream; the last reply for a model repeats once its queue drains
#[derive(Clone, Default)]
struct Upstream {
    script: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
    calls: Arc<Mutex<Vec<String>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

impl Upstream {
    fn reply(&self, model: &str, reply: Reply) -> &Self {
        self.script
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(&self, model: String, headers: &HeaderMap) -> Response {
        self.auth.lock().unwrap().push(
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
        self.calls.lock().unwrap().push(model.clone());

        let reply = {
            let mut script = self.script.lock().unwrap();
            match script.get_mut(&model) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        let reply = reply.unwrap_or_else(|| Reply::status(404, json!({"error": "model not found"})));

        let status = StatusCode::from_u16(reply.status).unwrap();
        let mut response = (status, Json(reply.body)).into_response();
        if let Some(seconds) = reply.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, seconds.parse().unwrap());
        }
        response
    }
}

async fn chat_completions(
    State(upstream): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let model = body["model"].as_str().unwrap_or_default().to_string();
    upstream.respond(model, &headers)
}

async fn zero_shot(
    State(upstream): State<Upstream>,
    Path(model): Path<String>,
    headers: HeaderMap,
    Json(_body): Json<Value>,
) -> Response {
    upstream.respond(model.trim_start_matches('/').to_string(), &headers)
}

/// Never answers within any test's lifetime
async fn hang() -> StatusCode {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    StatusCode::OK
}

/// Serve `upstream` on an ephemeral port and return its base URL
async fn spawn_upstream(upstream: Upstream) -> String {
    let app = Router::new()
        .route("/v1/chat", post(chat_completions))
        .route("/models/*model", post(zero_shot))
        .route("/hang/*rest", post(hang))
        .with_state(upstream);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn settings(role: ProviderRole, endpoint: String, models: &[&str]) -> ProviderSettings {
    let mut settings = ProviderSettings::role_defaults(role);
    settings.endpoint = Some(endpoint);
    settings.models = models.iter().map(|m| m.to_string()).collect();
    settings.api_key = Some("test-key".to_string());
    settings.policy.base_delay = Duration::from_millis(5);
    settings.policy.max_delay = Duration::from_millis(50);
    settings.requests_per_second = 100;
    settings.timeout = Duration::from_secs(5);
    settings
}

async fn chat_provider(upstream: &Upstream, models: &[&str]) -> ChatProvider {
    let base = spawn_upstream(upstream.clone()).await;
    ChatProvider::new(&settings(ProviderRole::Thorough, format!("{}/v1/chat", base), models))
}

async fn zero_shot_provider(upstream: &Upstream, models: &[&str]) -> ZeroShotProvider {
    let base = spawn_upstream(upstream.clone()).await;
    ZeroShotProvider::new(&settings(ProviderRole::Fast, format!("{}/models", base), models))
}

#[tokio::test]
async fn test_chat_substitutes_missing_model() {
    let upstream = Upstream::default();
    upstream
        .reply("retired", Reply::status(404, json!({"error": "not found"})))
        .reply("current", Reply::chat("Statistics"));

    let provider = chat_provider(&upstream, &["retired", "current"]).await;
    let vote = provider.classify("大埔火災", "最新傷亡數字").await.unwrap();

    assert_eq!(vote.category, Category::Statistics);
    assert_eq!(vote.confidence, 0.85);
    assert_eq!(vote.provider_id, "thorough");
    assert_eq!(upstream.calls(), vec!["retired", "current"]);

    let auth = upstream.auth.lock().unwrap().clone();
    assert!(auth.iter().all(|a| a.as_deref() == Some("Bearer test-key")));
}

#[tokio::test]
async fn test_chat_retries_rate_limited_backend() {
    let upstream = Upstream::default();
    upstream
        .reply(
            "m1",
            Reply {
                retry_after: Some("0"),
                ..Reply::status(429, json!({"error": "rate limited"}))
            },
        )
        .reply("m1", Reply::chat("financial-support"));

    let provider = chat_provider(&upstream, &["m1", "m2"]).await;
    let vote = provider.classify("捐款", "").await.unwrap();

    assert_eq!(vote.category, Category::FinancialSupport);
    assert_eq!(upstream.calls(), vec!["m1", "m1"]);
}

#[tokio::test]
async fn test_chat_skips_decommissioned_model() {
    let upstream = Upstream::default();
    upstream
        .reply(
            "old",
            Reply::status(
                400,
                json!({"error": {"message": "decommissioned", "code": "model_decommissioned"}}),
            ),
        )
        .reply("new", Reply::chat("The answer is medical-legal."));

    let provider = chat_provider(&upstream, &["old", "new"]).await;
    let vote = provider.classify("t", "c").await.unwrap();

    assert_eq!(vote.category, Category::MedicalLegal);
    assert_eq!(vote.confidence, 0.70);
    assert_eq!(upstream.calls(), vec!["old", "new"]);
}

#[tokio::test]
async fn test_chat_answer_outside_label_set_is_no_vote() {
    let upstream = Upstream::default();
    upstream.reply("m1", Reply::chat("banana"));

    let provider = chat_provider(&upstream, &["m1", "m2"]).await;

    assert!(provider.classify("t", "c").await.is_none());
    assert_eq!(upstream.calls(), vec!["m1"]);
}

#[tokio::test]
async fn test_chat_exhausts_every_backend() {
    let upstream = Upstream::default();
    upstream
        .reply("m1", Reply::status(500, json!({"error": "boom"})))
        .reply("m2", Reply::status(503, json!({"error": "down"})));

    let provider = chat_provider(&upstream, &["m1", "m2"]).await;

    assert!(provider.classify("t", "c").await.is_none());
    assert_eq!(upstream.calls(), vec!["m1", "m1", "m2", "m2"]);
}

#[tokio::test]
async fn test_zero_shot_takes_top_label() {
    let upstream = Upstream::default();
    upstream.reply(
        ZERO_SHOT_MODEL,
        Reply::ok(json!({
            "sequence": "大埔火災",
            "labels": ["general-news", "statistics", "accommodation"],
            "scores": [0.10, 0.82, 0.08]
        })),
    );

    let provider = zero_shot_provider(&upstream, &[ZERO_SHOT_MODEL]).await;
    let vote = provider.classify("大埔火災", "").await.unwrap();

    assert_eq!(vote.category, Category::Statistics);
    assert_eq!(vote.confidence, 0.82);
    assert_eq!(vote.provider_id, "fast");
    assert_eq!(upstream.calls(), vec![ZERO_SHOT_MODEL]);
}

#[tokio::test]
async fn test_zero_shot_waits_for_loading_model() {
    let upstream = Upstream::default();
    upstream
        .reply(
            ZERO_SHOT_MODEL,
            Reply::status(503, json!({"error": "Model is currently loading", "estimated_time": 0.01})),
        )
        .reply(
            ZERO_SHOT_MODEL,
            Reply::ok(json!([
                {"label": "accommodation", "score": 0.64},
                {"label": "general-news", "score": 0.36}
            ])),
        );

    let provider = zero_shot_provider(&upstream, &[ZERO_SHOT_MODEL]).await;
    let vote = provider.classify("臨時住宿", "").await.unwrap();

    assert_eq!(vote.category, Category::Accommodation);
    assert_eq!(upstream.calls().len(), 2);
}

#[tokio::test]
async fn test_zero_shot_abandons_on_unhinted_transient() {
    let upstream = Upstream::default();
    upstream
        .reply("m1", Reply::status(503, json!({"error": "overloaded"})))
        .reply("m2", Reply::ok(json!({"labels": ["statistics"], "scores": [0.9]})));

    let provider = zero_shot_provider(&upstream, &["m1", "m2"]).await;

    assert!(provider.classify("t", "c").await.is_none());
    assert_eq!(upstream.calls(), vec!["m1"]);
}

#[tokio::test]
async fn test_zero_shot_unknown_label_moves_on() {
    let upstream = Upstream::default();
    upstream
        .reply("m1", Reply::ok(json!({"labels": ["investigation"], "scores": [0.99]})))
        .reply("m2", Reply::ok(json!({"labels": ["reconstruction"], "scores": [0.7]})));

    let provider = zero_shot_provider(&upstream, &["m1", "m2"]).await;
    let vote = provider.classify("t", "c").await.unwrap();

    assert_eq!(vote.category, Category::Reconstruction);
    assert_eq!(upstream.calls(), vec!["m1", "m2"]);
}

#[tokio::test]
async fn test_disabled_provider_sends_nothing() {
    let upstream = Upstream::default();
    let provider = chat_provider(&upstream, &[]).await;

    assert!(provider.classify("t", "c").await.is_none());
    assert!(upstream.calls().is_empty());
}

#[tokio::test]
async fn test_arbiter_returns_normalised_answer() {
    let upstream = Upstream::default();
    upstream.reply("judge", Reply::chat("  Statistics \n"));

    let base = spawn_upstream(upstream.clone()).await;
    let arbiter = ChatArbiter::new(&settings(
        ProviderRole::Arbiter,
        format!("{}/v1/chat", base),
        &["judge"],
    ));

    let a = Vote::new("fast", Category::FinancialSupport, 0.6);
    let b = Vote::new("thorough", Category::Statistics, 0.85);
    let answer = arbiter.arbitrate("t", "c", &a, &b).await;

    assert_eq!(answer.as_deref(), Some("statistics"));
}

#[tokio::test]
async fn test_ensemble_from_config_reaches_consensus() {
    let upstream = Upstream::default();
    upstream
        .reply(
            ZERO_SHOT_MODEL,
            Reply::ok(json!({"labels": ["government-announcement"], "scores": [0.71]})),
        )
        .reply("chat-model", Reply::chat("government-announcement"));
    let base = spawn_upstream(upstream.clone()).await;

    let providers = ProvidersToml {
        fast: ProviderToml {
            endpoint: Some(format!("{}/models/", base)),
            api_key: Some("k".to_string()),
            ..Default::default()
        },
        thorough: ProviderToml {
            endpoint: Some(format!("{}/v1/chat", base)),
            models: Some(vec!["chat-model".to_string()]),
            api_key: Some("k".to_string()),
            ..Default::default()
        },
        arbiter: ProviderToml {
            models: Some(Vec::new()),
            ..Default::default()
        },
    };

    let ensemble = ClassifierEnsemble::from_config(&providers, &EnsembleConfig::default());
    let result = ensemble.classify("政府公布", "最新安排").await;

    assert_eq!(result.category, Category::GovernmentAnnouncement);
    assert_eq!(result.decision_path, DecisionPath::Consensus);
    assert!(result.arbiter_answer.is_none());

    let mut calls = upstream.calls();
    calls.sort();
    assert_eq!(calls, vec!["chat-model", ZERO_SHOT_MODEL]);
}

#[tokio::test]
async fn test_hung_upstream_cannot_block_ensemble() {
    let upstream = Upstream::default();
    let base = spawn_upstream(upstream.clone()).await;

    let mut fast = settings(ProviderRole::Fast, format!("{}/hang/models", base), &[ZERO_SHOT_MODEL]);
    fast.timeout = Duration::from_millis(200);
    let mut thorough = settings(
        ProviderRole::Thorough,
        format!("{}/hang/chat", base),
        &["m1", "m2"],
    );
    thorough.timeout = Duration::from_millis(200);
    let arbiter = settings(ProviderRole::Arbiter, format!("{}/hang/chat", base), &[]);

    let ensemble = ClassifierEnsemble::new(
        Arc::new(ZeroShotProvider::new(&fast)),
        Arc::new(ChatProvider::new(&thorough)),
        Arc::new(ChatArbiter::new(&arbiter)),
        &EnsembleConfig::default(),
    );

    let started = Instant::now();
    let result = ensemble.classify("大埔火災", "5人死亡").await;
    let elapsed = started.elapsed();

    assert_eq!(result.category, Category::Statistics);
    assert_eq!(result.decision_path, DecisionPath::Fallback);
    assert!(result.vote_a.is_none() && result.vote_b.is_none());
    // thorough: two models, one retry each, 200ms timeout per attempt
    assert!(elapsed < Duration::from_secs(5), "ensemble took {:?}", elapsed);
}
