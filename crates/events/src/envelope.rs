use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{WebhookEvent, WebhookEventType};

/// Envelope delivered to webhook subscribers.
///
/// Wire shape: `{"event_type": ..., "data": {...}, "timestamp": "<RFC 3339 UTC>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(flatten)]
    event: WebhookEvent,
    timestamp: DateTime<Utc>,
}

impl WebhookPayload {
    pub fn new(event: WebhookEvent, timestamp: DateTime<Utc>) -> Self {
        Self { event, timestamp }
    }

    /// Stamp an event with the current time.
    pub fn now(event: WebhookEvent) -> Self {
        Self::new(event, Utc::now())
    }

    /// Sample payload for a given event type (docs / test deliveries).
    pub fn sample(event_type: WebhookEventType) -> Self {
        Self::now(event_type.sample_event())
    }

    pub fn event(&self) -> &WebhookEvent {
        &self.event
    }

    pub fn event_type(&self) -> WebhookEventType {
        self.event.event_type()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
