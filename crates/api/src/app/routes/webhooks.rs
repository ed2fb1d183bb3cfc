use axum::{response::IntoResponse, Json};
use serde_json::json;

use catalog_events::{WebhookEventType, WebhookPayload};

/// Every event type a subscription may listen for, with an example body.
pub async fn event_types() -> impl IntoResponse {
    let types: Vec<_> = WebhookEventType::ALL
        .iter()
        .map(|t| {
            json!({
                "event_type": t.as_str(),
                "sample_payload": WebhookPayload::sample(*t),
            })
        })
        .collect();
    Json(json!({ "event_types": types }))
}
