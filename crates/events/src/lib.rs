//! Integration events emitted by the job pipeline to external subscribers.

pub mod envelope;
pub mod event;

pub use envelope::WebhookPayload;
pub use event::{WebhookEvent, WebhookEventType};
