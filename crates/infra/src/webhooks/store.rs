//! Read-only access to webhook subscriptions.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::instrument;

use catalog_core::WebhookId;
use catalog_events::WebhookEventType;

use super::WebhookError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: WebhookId,
    pub name: String,
    pub url: String,
    pub event_type: WebhookEventType,
    pub is_active: bool,
}

impl WebhookSubscription {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        event_type: WebhookEventType,
    ) -> Self {
        Self {
            id: WebhookId::new(),
            name: name.into(),
            url: url.into(),
            event_type,
            is_active: true,
        }
    }
}

#[async_trait::async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// Active subscriptions whose event type matches exactly.
    async fn active_for(
        &self,
        event_type: WebhookEventType,
    ) -> Result<Vec<WebhookSubscription>, WebhookError>;
}

#[derive(Debug, Default)]
pub struct InMemorySubscriptionSource {
    subscriptions: RwLock<Vec<WebhookSubscription>>,
}

impl InMemorySubscriptionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn register(&self, subscription: WebhookSubscription) {
        if let Ok(mut subs) = self.subscriptions.write() {
            subs.push(subscription);
        }
    }
}

#[async_trait::async_trait]
impl SubscriptionSource for InMemorySubscriptionSource {
    async fn active_for(
        &self,
        event_type: WebhookEventType,
    ) -> Result<Vec<WebhookSubscription>, WebhookError> {
        let subs = self
            .subscriptions
            .read()
            .map_err(|_| WebhookError::Lookup("subscription lock poisoned".to_string()))?;
        Ok(subs
            .iter()
            .filter(|s| s.is_active && s.event_type == event_type)
            .cloned()
            .collect())
    }
}

/// Subscriptions stored in the `webhooks` table.
#[derive(Clone)]
pub struct PostgresSubscriptionSource {
    pool: Arc<PgPool>,
}

impl PostgresSubscriptionSource {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl SubscriptionSource for PostgresSubscriptionSource {
    #[instrument(skip(self), err)]
    async fn active_for(
        &self,
        event_type: WebhookEventType,
    ) -> Result<Vec<WebhookSubscription>, WebhookError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, url, is_active
            FROM webhooks
            WHERE event_type = $1 AND is_active = TRUE
            "#,
        )
        .bind(event_type.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| WebhookError::Lookup(format!("sqlx error in active_for: {e}")))?;

        rows.iter()
            .map(|row| {
                let read = |e: sqlx::Error| WebhookError::Lookup(format!("bad webhook row: {e}"));
                let id: uuid::Uuid = row.try_get("id").map_err(read)?;
                Ok(WebhookSubscription {
                    id: WebhookId::from_uuid(id),
                    name: row.try_get("name").map_err(read)?,
                    url: row.try_get("url").map_err(read)?,
                    event_type,
                    is_active: row.try_get("is_active").map_err(read)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_active_exact_matches_are_returned() {
        let source = InMemorySubscriptionSource::new();
        source.register(WebhookSubscription::new(
            "erp",
            "http://erp.local/hook",
            WebhookEventType::ProductUploadComplete,
        ));
        let mut paused = WebhookSubscription::new(
            "paused",
            "http://paused.local/hook",
            WebhookEventType::ProductUploadComplete,
        );
        paused.is_active = false;
        source.register(paused);
        source.register(WebhookSubscription::new(
            "cleanup",
            "http://cleanup.local/hook",
            WebhookEventType::BulkDeleteComplete,
        ));

        let subs = source
            .active_for(WebhookEventType::ProductUploadComplete)
            .await
            .unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].name, "erp");
    }
}
