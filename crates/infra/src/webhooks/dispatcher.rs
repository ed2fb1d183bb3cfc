use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use catalog_core::WebhookId;
use catalog_events::{WebhookEvent, WebhookEventType, WebhookPayload};

use super::{SubscriptionSource, WebhookError, WebhookTransport};

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub webhook_id: WebhookId,
    pub url: String,
    pub outcome: Result<u16, WebhookError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub event_type: WebhookEventType,
    pub deliveries: Vec<DeliveryResult>,
}

impl DispatchReport {
    fn empty(event_type: WebhookEventType) -> Self {
        Self {
            event_type,
            deliveries: Vec::new(),
        }
    }

    pub fn delivered(&self) -> usize {
        self.deliveries.iter().filter(|d| d.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.deliveries.len() - self.delivered()
    }
}

/// Fans a completion event out to every active subscriber of its type.
///
/// Each subscriber gets exactly one attempt; failures are logged and never
/// retried or escalated.
#[derive(Clone)]
pub struct EventDispatcher {
    subscriptions: Arc<dyn SubscriptionSource>,
    transport: Arc<dyn WebhookTransport>,
}

impl EventDispatcher {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionSource>,
        transport: Arc<dyn WebhookTransport>,
    ) -> Self {
        Self {
            subscriptions,
            transport,
        }
    }

    pub async fn dispatch(&self, event: WebhookEvent) -> DispatchReport {
        let event_type = event.event_type();

        let subscriptions = match self.subscriptions.active_for(event_type).await {
            Ok(subs) => subs,
            Err(e) => {
                error!(event_type = %event_type, error = %e, "webhook lookup failed");
                return DispatchReport::empty(event_type);
            }
        };

        if subscriptions.is_empty() {
            debug!(event_type = %event_type, "no active webhooks");
            return DispatchReport::empty(event_type);
        }

        let payload = WebhookPayload::now(event);
        let deliveries = subscriptions.into_iter().map(|sub| {
            let payload = &payload;
            async move {
                let outcome = match self.transport.post(&sub.url, payload).await {
                    Ok(status) if status >= 400 => Err(WebhookError::Status(status)),
                    other => other,
                };

                match &outcome {
                    Ok(status) => info!(
                        webhook_id = %sub.id,
                        webhook = %sub.name,
                        status,
                        "webhook delivered"
                    ),
                    Err(e) => warn!(
                        webhook_id = %sub.id,
                        webhook = %sub.name,
                        error = %e,
                        "webhook delivery failed"
                    ),
                }

                DeliveryResult {
                    webhook_id: sub.id,
                    url: sub.url,
                    outcome,
                }
            }
        });

        DispatchReport {
            event_type,
            deliveries: join_all(deliveries).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::webhooks::{InMemorySubscriptionSource, WebhookSubscription};

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(String, serde_json::Value)>>,
    }

    #[async_trait::async_trait]
    impl WebhookTransport for RecordingTransport {
        async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<u16, WebhookError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), serde_json::to_value(payload).unwrap()));
            if url.contains("down") {
                return Err(WebhookError::Request("connection refused".into()));
            }
            if url.contains("broken") {
                return Ok(500);
            }
            Ok(200)
        }
    }

    fn setup() -> (Arc<InMemorySubscriptionSource>, Arc<RecordingTransport>, EventDispatcher) {
        let source = InMemorySubscriptionSource::arc();
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = EventDispatcher::new(source.clone(), transport.clone());
        (source, transport, dispatcher)
    }

    #[tokio::test]
    async fn sends_to_every_active_matching_subscriber_only() {
        let (source, transport, dispatcher) = setup();
        source.register(WebhookSubscription::new(
            "a",
            "http://a.local",
            WebhookEventType::ProductUploadComplete,
        ));
        source.register(WebhookSubscription::new(
            "b",
            "http://b.local",
            WebhookEventType::ProductUploadComplete,
        ));
        source.register(WebhookSubscription::new(
            "other",
            "http://other.local",
            WebhookEventType::BulkDeleteComplete,
        ));
        let mut inactive = WebhookSubscription::new(
            "off",
            "http://off.local",
            WebhookEventType::ProductUploadComplete,
        );
        inactive.is_active = false;
        source.register(inactive);

        let report = dispatcher
            .dispatch(WebhookEvent::ProductUploadComplete {
                total_products: 500_000,
            })
            .await;
        assert_eq!(report.delivered(), 2);

        let calls = transport.calls.lock().unwrap();
        let mut urls: Vec<_> = calls.iter().map(|(u, _)| u.as_str()).collect();
        urls.sort();
        assert_eq!(urls, vec!["http://a.local", "http://b.local"]);
        for (_, body) in calls.iter() {
            assert_eq!(body["event_type"], "product_upload_complete");
            assert_eq!(body["data"], serde_json::json!({"total_products": 500000}));
            assert!(body["timestamp"].is_string());
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_block_others() {
        let (source, transport, dispatcher) = setup();
        for (name, url) in [
            ("down", "http://down.local"),
            ("broken", "http://broken.local"),
            ("ok", "http://ok.local"),
        ] {
            source.register(WebhookSubscription::new(
                name,
                url,
                WebhookEventType::BulkDeleteComplete,
            ));
        }

        let report = dispatcher
            .dispatch(WebhookEvent::BulkDeleteComplete { deleted_count: 0 })
            .await;

        assert_eq!(report.deliveries.len(), 3);
        assert_eq!(report.delivered(), 1);
        assert_eq!(report.failed(), 2);
        assert!(report
            .deliveries
            .iter()
            .any(|d| d.outcome == Err(WebhookError::Status(500))));
        // single attempt per subscriber
        assert_eq!(transport.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn no_subscribers_is_a_no_op() {
        let (_source, transport, dispatcher) = setup();
        let report = dispatcher
            .dispatch(WebhookEvent::BulkDeleteComplete { deleted_count: 3 })
            .await;
        assert!(report.deliveries.is_empty());
        assert!(transport.calls.lock().unwrap().is_empty());
    }
}
