//! Aggregate statistics endpoint

use axum::{extract::State, routing::get, Json, Router};

use crate::db::StatsSnapshot;
use crate::error::ApiResult;
use crate::AppState;

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StatsSnapshot>> {
    match state.reconciler.snapshot().await {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(e) => Err(state.record_error(e).await),
    }
}

pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/api/stats", get(get_stats))
}
