use core::str::FromStr;

use serde::{Deserialize, Serialize};

use catalog_core::DomainError;

/// Closed set of event types a webhook can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    ProductUploadComplete,
    BulkDeleteComplete,
}

impl WebhookEventType {
    pub const ALL: [WebhookEventType; 2] = [
        WebhookEventType::ProductUploadComplete,
        WebhookEventType::BulkDeleteComplete,
    ];

    /// Stable wire name (e.g. "product_upload_complete").
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventType::ProductUploadComplete => "product_upload_complete",
            WebhookEventType::BulkDeleteComplete => "bulk_delete_complete",
        }
    }

    /// Representative event used for documentation and test deliveries.
    pub fn sample_event(&self) -> WebhookEvent {
        match self {
            WebhookEventType::ProductUploadComplete => WebhookEvent::ProductUploadComplete {
                total_products: 500_000,
            },
            WebhookEventType::BulkDeleteComplete => WebhookEvent::BulkDeleteComplete {
                deleted_count: 1_000_000,
            },
        }
    }
}

impl core::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookEventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let valid = Self::ALL.map(|t| t.as_str()).join(", ");
                DomainError::validation(format!(
                    "invalid event type '{s}'. Valid types are: {valid}"
                ))
            })
    }
}

/// A completion event with its type-specific data.
///
/// Serializes as `{"event_type": ..., "data": {...}}` so the payload shape is
/// fixed per variant at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum WebhookEvent {
    ProductUploadComplete { total_products: u64 },
    BulkDeleteComplete { deleted_count: u64 },
}

impl WebhookEvent {
    pub fn event_type(&self) -> WebhookEventType {
        match self {
            WebhookEvent::ProductUploadComplete { .. } => WebhookEventType::ProductUploadComplete,
            WebhookEvent::BulkDeleteComplete { .. } => WebhookEventType::BulkDeleteComplete,
        }
    }
}
