//! Classification endpoint

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::classifier::ConsensusResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// POST /api/classify
///
/// Always answers with a category; provider outages only change the
/// `decision_path`.
pub async fn classify(
    State(state): State<AppState>,
    Json(request): Json<ClassifyRequest>,
) -> Json<ConsensusResult> {
    let result = state
        .ensemble
        .classify(&request.title, &request.content)
        .await;
    Json(result)
}

pub fn classify_routes() -> Router<AppState> {
    Router::new().route("/api/classify", post(classify))
}
