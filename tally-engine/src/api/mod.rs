//! HTTP API handlers for tally-engine
//!
//! JSON in/out over axum, plus an SSE stream of engine events.

pub mod classify;
pub mod facts;
pub mod health;
pub mod sse;
pub mod stats;

pub use classify::classify_routes;
pub use facts::fact_routes;
pub use health::health_routes;
pub use sse::event_stream;
pub use stats::stats_routes;
