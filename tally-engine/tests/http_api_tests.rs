//! Integration tests for tally-engine HTTP endpoints

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tally_common::config::{EnsembleConfig, ReconciliationConfig};
use tally_common::events::{EventBus, TallyEvent};
use tally_common::{Category, Metric};
use tally_engine::classifier::{Arbiter, ClassifierEnsemble, ClassifierProvider, Vote};
use tally_engine::db::{init_memory_pool, MemoryFactStore, SqliteFactStore};
use tally_engine::reconciliation::Reconciler;
use tally_engine::AppState;
use tower::util::ServiceExt;

struct FixedProvider {
    id: &'static str,
    vote: Option<(Category, f64)>,
}

#[async_trait]
impl ClassifierProvider for FixedProvider {
    fn provider_id(&self) -> &str {
        self.id
    }

    async fn classify(&self, _title: &str, _content: &str) -> Option<Vote> {
        self.vote.map(|(category, confidence)| Vote::new(self.id, category, confidence))
    }
}

struct FixedArbiter(Option<&'static str>);

#[async_trait]
impl Arbiter for FixedArbiter {
    async fn arbitrate(&self, _t: &str, _c: &str, _a: &Vote, _b: &Vote) -> Option<String> {
        self.0.map(str::to_string)
    }
}

fn ensemble(a: Option<(Category, f64)>, b: Option<(Category, f64)>, arbiter: Option<&'static str>) -> ClassifierEnsemble {
    ClassifierEnsemble::new(
        Arc::new(FixedProvider { id: "fast", vote: a }),
        Arc::new(FixedProvider { id: "thorough", vote: b }),
        Arc::new(FixedArbiter(arbiter)),
        &EnsembleConfig::default(),
    )
}

fn test_app_with(ensemble: ClassifierEnsemble) -> axum::Router {
    let event_bus = EventBus::new(100);
    let reconciler = Reconciler::new(Arc::new(MemoryFactStore::new()), &ReconciliationConfig::default())
        .with_event_bus(event_bus.clone());
    tally_engine::build_router(AppState::new(reconciler, ensemble, event_bus))
}

fn test_app() -> axum::Router {
    test_app_with(ensemble(None, None, None))
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();
    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "tally-engine");
    assert!(json["uptime_seconds"].is_u64());
    assert!(json.get("last_error").is_none());
}

#[tokio::test]
async fn test_fact_flow_confirms_and_ratchets() {
    let app = test_app();

    let (status, first) = send(
        &app,
        "POST",
        "/api/facts",
        Some(json!({"metric": "casualties", "value": 5, "source_id": "RTHK"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["confirmed"], false);
    assert_eq!(first["outcome"], "pending-created");
    assert_eq!(first["value"], 0);

    let (_, second) = send(
        &app,
        "POST",
        "/api/facts",
        Some(json!({"metric": "casualties", "value": 5, "source_id": "GovNews"})),
    )
    .await;
    assert_eq!(second["confirmed"], true);
    assert_eq!(second["outcome"], "promoted");
    assert_eq!(second["value"], 5);
    assert_eq!(second["verified_sources"], json!(["GovNews", "RTHK"]));

    let (_, third) = send(
        &app,
        "POST",
        "/api/facts",
        Some(json!({"metric": "casualties", "value": 3, "source_id": "Wikipedia"})),
    )
    .await;
    assert_eq!(third["outcome"], "below-ratchet");
    assert_eq!(third["value"], 5);

    let (status, stats) = send(&app, "GET", "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["casualties"], 5);
    assert_eq!(stats["injured"], 0);
    assert_eq!(stats["source"], "GovNews, RTHK");
    assert_eq!(stats["pending_updates"], json!({}));
}

#[tokio::test]
async fn test_blank_source_is_bad_request() {
    let app = test_app();
    let (status, json) = send(
        &app,
        "POST",
        "/api/facts",
        Some(json!({"metric": "injured", "value": 2, "source_id": "   "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_unknown_metric_is_rejected() {
    let app = test_app();
    let (status, _) = send(
        &app,
        "POST",
        "/api/facts",
        Some(json!({"metric": "deaths", "value": 2, "source_id": "RTHK"})),
    )
    .await;

    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_document_ingestion() {
    let app = test_app();
    let (status, json) = send(
        &app,
        "POST",
        "/api/documents",
        Some(json!({
            "source_id": "RTHK",
            "title": "大埔火災",
            "content": "火災造成12人死亡，另有8人受傷"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stats"]["casualties"], 12);
    assert_eq!(json["stats"]["injured"], 8);
    assert_eq!(json["stats"]["found"], true);
    assert_eq!(json["results"].as_array().unwrap().len(), 2);

    let (_, stats) = send(&app, "GET", "/api/stats", None).await;
    assert_eq!(stats["pending_updates"]["casualties"]["value"], 12);
}

#[tokio::test]
async fn test_classify_falls_back_when_providers_down() {
    let app = test_app();
    let (status, json) = send(
        &app,
        "POST",
        "/api/classify",
        Some(json!({"title": "大埔火災", "content": "火災造成多人死亡"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["category"], "statistics");
    assert_eq!(json["decision_path"], "fallback");
    assert!(json["vote_a"].is_null());
}

#[tokio::test]
async fn test_classify_arbitration_over_http() {
    let app = test_app_with(ensemble(
        Some((Category::FinancialSupport, 0.60)),
        Some((Category::Statistics, 0.65)),
        Some("statistics"),
    ));
    let (status, json) = send(
        &app,
        "POST",
        "/api/classify",
        Some(json!({"title": "t", "content": "c"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["category"], "statistics");
    assert_eq!(json["decision_path"], "arbitration");
    assert_eq!(json["vote_a"]["category"], "financial-support");
    assert_eq!(json["arbiter_answer"], "statistics");
}

#[tokio::test]
async fn test_classify_empty_article_still_resolves() {
    let app = test_app_with(ensemble(
        Some((Category::Statistics, 0.9)),
        Some((Category::Statistics, 0.9)),
        None,
    ));
    let (status, json) = send(
        &app,
        "POST",
        "/api/classify",
        Some(json!({"title": " ", "content": ""})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["category"], "general-news");
    assert_eq!(json["decision_path"], "fallback");
}

#[tokio::test]
async fn test_store_failure_marks_health_degraded() {
    let pool = init_memory_pool().await.unwrap();
    let store = SqliteFactStore::new(pool.clone());
    sqlx::query("DROP TABLE metric_state").execute(&pool).await.unwrap();

    let event_bus = EventBus::new(10);
    let reconciler = Reconciler::new(Arc::new(store), &ReconciliationConfig::default());
    let app = tally_engine::build_router(AppState::new(
        reconciler,
        ensemble(None, None, None),
        event_bus,
    ));

    let (status, json) = send(&app, "GET", "/api/stats", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["code"], "INTERNAL_ERROR");

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["status"], "degraded");
    assert!(health["last_error"].is_string());
}

#[tokio::test]
async fn test_event_stream_forwards_events() {
    let event_bus = EventBus::new(16);
    let reconciler = Reconciler::new(Arc::new(MemoryFactStore::new()), &ReconciliationConfig::default())
        .with_event_bus(event_bus.clone());
    let app = tally_engine::build_router(AppState::new(
        reconciler,
        ensemble(None, None, None),
        event_bus.clone(),
    ));

    let response = app
        .oneshot(Request::builder().uri("/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    event_bus.emit_lossy(TallyEvent::MetricConfirmed {
        metric: Metric::Casualties,
        value: 5,
        verified_sources: vec!["GovNews".to_string(), "RTHK".to_string()],
        timestamp: chrono::Utc::now(),
    });

    // First frame is the event, not a heartbeat comment
    let mut body = response.into_body();
    let frame = tokio::time::timeout(std::time::Duration::from_secs(2), body.frame())
        .await
        .expect("no frame within 2s")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();

    assert!(text.starts_with("event: MetricConfirmed"), "{}", text);
    assert!(text.contains("\"value\":5"), "{}", text);
}
