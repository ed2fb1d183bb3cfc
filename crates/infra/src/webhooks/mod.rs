//! Completion-event fan-out to registered webhook subscribers.

pub mod dispatcher;
pub mod store;
pub mod transport;

pub use dispatcher::{DeliveryResult, DispatchReport, EventDispatcher};
pub use store::{
    InMemorySubscriptionSource, PostgresSubscriptionSource, SubscriptionSource,
    WebhookSubscription,
};
pub use transport::{HttpWebhookTransport, WebhookTransport};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookError {
    #[error("subscription lookup failed: {0}")]
    Lookup(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out")]
    Timeout,
    #[error("subscriber responded with status {0}")]
    Status(u16),
}
