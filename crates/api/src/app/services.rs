use std::sync::Arc;

use catalog_infra::catalog::{CatalogStore, InMemoryCatalogStore};
use catalog_infra::jobs::{
    CheckpointStore, ChunkedJobProcessor, InMemoryCheckpointStore, JobExecutor,
    JobExecutorConfig, JobExecutorHandle, JobService, PipelineDeps, RetryController,
    SubmissionError,
};
use catalog_infra::progress::{InMemoryProgressCache, ProgressCache};
use catalog_infra::webhooks::{
    EventDispatcher, HttpWebhookTransport, InMemorySubscriptionSource, SubscriptionSource,
    WebhookError, WebhookTransport,
};
use catalog_infra::{PipelineConfig, StorageConfig};

#[cfg(feature = "redis")]
use catalog_infra::{
    catalog::PostgresCatalogStore,
    jobs::PostgresCheckpointStore,
    progress::{CacheError, RedisProgressCache},
    schema::{ensure_schema, SchemaError},
    webhooks::PostgresSubscriptionSource,
};
#[cfg(feature = "redis")]
use sqlx::postgres::PgPoolOptions;

/// Failures while wiring the stores at startup.
#[derive(Debug, thiserror::Error)]
pub enum ServicesError {
    #[error("webhook transport: {0}")]
    Webhook(#[from] WebhookError),
    #[cfg(feature = "redis")]
    #[error("database connection: {0}")]
    Database(#[from] sqlx::Error),
    #[cfg(feature = "redis")]
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[cfg(feature = "redis")]
    #[error("progress cache: {0}")]
    Cache(#[from] CacheError),
    #[error("resuming unfinished jobs: {0}")]
    Recovery(#[from] SubmissionError),
}

/// Everything the handlers need, shared behind an `Arc`.
#[derive(Clone)]
pub struct AppServices {
    pub jobs: JobService,
    /// `memory` or `postgres`, reported by `/health`.
    pub storage: &'static str,
}

/// Collaborator set backing one pipeline instance.
#[derive(Clone)]
pub struct Stores {
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub cache: Arc<dyn ProgressCache>,
    pub catalog: Arc<dyn CatalogStore>,
    pub subscriptions: Arc<dyn SubscriptionSource>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            checkpoints: InMemoryCheckpointStore::arc(),
            cache: InMemoryProgressCache::arc(),
            catalog: InMemoryCatalogStore::arc(),
            subscriptions: InMemorySubscriptionSource::arc(),
        }
    }

    #[cfg(feature = "redis")]
    async fn persistent(database_url: &str, redis_url: &str) -> Result<Self, ServicesError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        ensure_schema(&pool).await?;
        let cache = RedisProgressCache::connect(redis_url).await?;

        Ok(Self {
            checkpoints: Arc::new(PostgresCheckpointStore::new(pool.clone())),
            cache: Arc::new(cache),
            catalog: Arc::new(PostgresCatalogStore::new(pool.clone())),
            subscriptions: Arc::new(PostgresSubscriptionSource::new(pool)),
        })
    }
}

/// Wire stores from configuration and start the worker pool.
pub async fn build_services(
    pipeline: &PipelineConfig,
    storage: &StorageConfig,
) -> Result<(AppServices, JobExecutorHandle), ServicesError> {
    match storage {
        StorageConfig::InMemory => build_in_memory_services(pipeline).await,
        StorageConfig::Persistent {
            database_url,
            redis_url,
        } => {
            #[cfg(feature = "redis")]
            {
                let stores = Stores::persistent(database_url, redis_url).await?;
                let transport = Arc::new(HttpWebhookTransport::new(pipeline.webhook_timeout)?);
                start(pipeline, stores, transport, "postgres").await
            }
            #[cfg(not(feature = "redis"))]
            {
                let _ = (database_url, redis_url);
                tracing::warn!(
                    "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
                );
                build_in_memory_services(pipeline).await
            }
        }
    }
}

pub async fn build_in_memory_services(
    pipeline: &PipelineConfig,
) -> Result<(AppServices, JobExecutorHandle), ServicesError> {
    let transport = Arc::new(HttpWebhookTransport::new(pipeline.webhook_timeout)?);
    start(pipeline, Stores::in_memory(), transport, "memory").await
}

/// Start a worker pool over `stores`, re-queue jobs a previous process left
/// unfinished, and return the submission facade.
pub async fn start(
    pipeline: &PipelineConfig,
    stores: Stores,
    transport: Arc<dyn WebhookTransport>,
    storage: &'static str,
) -> Result<(AppServices, JobExecutorHandle), ServicesError> {
    let deps = PipelineDeps {
        checkpoints: stores.checkpoints.clone(),
        cache: stores.cache.clone(),
        catalog: stores.catalog,
        dispatcher: EventDispatcher::new(stores.subscriptions, transport),
    };
    let processor =
        ChunkedJobProcessor::new(deps, pipeline.chunk_size, pipeline.delete_chunk_size);
    let retry = RetryController::new(pipeline.retry_policy());

    let executor = JobExecutor::new(processor, retry)
        .spawn(JobExecutorConfig::default().with_workers(pipeline.workers));

    let jobs = JobService::new(
        stores.checkpoints,
        stores.cache,
        executor.queue(),
        pipeline.upload_dir.clone(),
    );
    let resumed = jobs.resume_unfinished().await?;
    tracing::info!(storage, workers = pipeline.workers, resumed, "services ready");
    Ok((AppServices { jobs, storage }, executor))
}
