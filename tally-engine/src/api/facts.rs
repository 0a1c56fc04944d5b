//! Fact proposal and document ingestion endpoints

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::reconciliation::{DocumentIngest, FactProposal, MergeResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub source_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// POST /api/facts
pub async fn submit_fact(
    State(state): State<AppState>,
    Json(proposal): Json<FactProposal>,
) -> ApiResult<Json<MergeResult>> {
    match state.reconciler.merge(&proposal).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => Err(state.record_error(e).await),
    }
}

/// POST /api/documents
///
/// Extracts casualty statistics from the document and merges each one.
pub async fn submit_document(
    State(state): State<AppState>,
    Json(request): Json<DocumentRequest>,
) -> ApiResult<Json<DocumentIngest>> {
    match state
        .reconciler
        .ingest_document(&request.source_id, &request.title, &request.content)
        .await
    {
        Ok(ingest) => Ok(Json(ingest)),
        Err(e) => Err(state.record_error(e).await),
    }
}

pub fn fact_routes() -> Router<AppState> {
    Router::new()
        .route("/api/facts", post(submit_fact))
        .route("/api/documents", post(submit_document))
}
