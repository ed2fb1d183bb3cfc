use std::time::Duration;

use reqwest::Client;

use catalog_events::WebhookPayload;

use super::WebhookError;

/// One HTTP delivery attempt.
#[async_trait::async_trait]
pub trait WebhookTransport: Send + Sync {
    /// POST `payload` as JSON and return the response status.
    async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<u16, WebhookError>;
}

/// reqwest-backed transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpWebhookTransport {
    client: Client,
}

impl HttpWebhookTransport {
    pub fn new(timeout: Duration) -> Result<Self, WebhookError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WebhookError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<u16, WebhookError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WebhookError::Timeout
                } else {
                    WebhookError::Request(e.to_string())
                }
            })?;
        Ok(response.status().as_u16())
    }
}
