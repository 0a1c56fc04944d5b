//! Event types for the Tally event system
//!
//! Provides shared event definitions and the EventBus used to fan decisions
//! out to SSE clients and other in-process listeners.

use crate::{Category, DecisionPath, Metric};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Tally event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TallyEvent {
    /// Ensemble reached a final category
    ClassificationDecided {
        /// Correlates log lines for one classify call
        decision_id: Uuid,
        category: Category,
        decision_path: DecisionPath,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A metric proposal is waiting for more corroborating sources
    MetricPending {
        metric: Metric,
        value: u64,
        sources: Vec<String>,
        required_sources: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A metric was promoted to a new confirmed value
    MetricConfirmed {
        metric: Metric,
        value: u64,
        verified_sources: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A proposal fell below the ratchet and was discarded
    ProposalDiscarded {
        metric: Metric,
        value: u64,
        confirmed: u64,
        source_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl TallyEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            TallyEvent::ClassificationDecided { .. } => "ClassificationDecided",
            TallyEvent::MetricPending { .. } => "MetricPending",
            TallyEvent::MetricConfirmed { .. } => "MetricConfirmed",
            TallyEvent::ProposalDiscarded { .. } => "ProposalDiscarded",
        }
    }
}

/// Broadcast bus for TallyEvents
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TallyEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers drop old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<TallyEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TallyEvent) {
        let _ = self.tx.send(event);
    }
}
