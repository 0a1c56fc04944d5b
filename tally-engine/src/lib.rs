//! tally-engine library interface
//!
//! Multi-source consensus: numeric fact reconciliation with a monotonic
//! ratchet, and categorical classification by a two-provider ensemble with
//! arbitration and a keyword fallback.

pub mod api;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod reconciliation;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tally_common::events::EventBus;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::classifier::ClassifierEnsemble;
use crate::reconciliation::Reconciler;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub ensemble: Arc<ClassifierEnsemble>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last store error, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(reconciler: Reconciler, ensemble: ClassifierEnsemble, event_bus: EventBus) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            ensemble: Arc::new(ensemble),
            event_bus,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Convert a store-side error for the response, remembering server faults
    pub async fn record_error(&self, err: tally_common::Error) -> ApiError {
        let api_error = ApiError::from(err);
        if matches!(api_error, ApiError::Internal(_)) {
            tracing::error!(error = %api_error, "Request failed");
            *self.last_error.write().await = Some(api_error.to_string());
        }
        api_error
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::classify_routes())
        .merge(api::fact_routes())
        .merge(api::stats_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
