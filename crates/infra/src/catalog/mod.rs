//! Batch data operations against the product catalog.

use std::sync::Arc;

use catalog_products::ProductDraft;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryCatalogStore;
pub use postgres::PostgresCatalogStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Bulk mutations used by the job processor.
///
/// Upserts are idempotent and deletes are monotonic, so concurrent jobs
/// converge without cross-job locking.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or update a batch keyed by lower-cased SKU.
    ///
    /// The batch is deduplicated first (last occurrence wins). Returns the
    /// number of distinct rows written; an empty batch writes nothing.
    async fn bulk_upsert(&self, rows: Vec<ProductDraft>) -> Result<u64, CatalogError>;

    async fn count_all(&self) -> Result<u64, CatalogError>;

    /// Delete up to `limit` rows (unspecified which) and return how many went.
    async fn delete_chunk(&self, limit: u64) -> Result<u64, CatalogError>;
}

#[async_trait::async_trait]
impl<T: CatalogStore + ?Sized> CatalogStore for Arc<T> {
    async fn bulk_upsert(&self, rows: Vec<ProductDraft>) -> Result<u64, CatalogError> {
        (**self).bulk_upsert(rows).await
    }

    async fn count_all(&self) -> Result<u64, CatalogError> {
        (**self).count_all().await
    }

    async fn delete_chunk(&self, limit: u64) -> Result<u64, CatalogError> {
        (**self).delete_chunk(limit).await
    }
}
