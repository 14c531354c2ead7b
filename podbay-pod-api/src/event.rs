//! Event types carried by the bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identifier handed out by [`EventBus::subscribe`](crate::EventBus::subscribe).
pub type SubscriptionId = Uuid;

/// A single event dispatched through the bus.
///
/// Events are transient: they exist for the duration of one dispatch and
/// are never persisted or replayed. A handler only ever observes events
/// emitted after it subscribed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodEvent {
    /// Event name, e.g. `discovery.feature.loaded`
    pub name: String,
    /// Arbitrary JSON payload
    pub payload: Value,
    /// Name of the feature (or host component) that emitted the event
    pub source: String,
    /// Emission time
    pub timestamp: DateTime<Utc>,
}

impl PodEvent {
    /// Create an event stamped with the current time
    pub fn new(name: impl Into<String>, payload: Value, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload,
            source: source.into(),
            timestamp: Utc::now(),
        }
    }
}
