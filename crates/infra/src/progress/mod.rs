//! Progress cache: ephemeral, fast-read mirror of job counters.
//!
//! Never authoritative. Entries may be stale or missing; readers fall back to
//! the checkpoint store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use catalog_core::JobId;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::InMemoryProgressCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisProgressCache;

/// Status as recorded in the cache.
///
/// `Retrying` only ever lives here; the durable record stays PROCESSING while
/// a retry is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Pending,
    InProgress,
    Retrying,
    Completed,
    Failed,
}

impl ProgressStatus {
    /// Label exposed by the status read contract.
    pub fn public_label(&self) -> &'static str {
        match self {
            ProgressStatus::Pending => "pending",
            ProgressStatus::InProgress | ProgressStatus::Retrying => "in_progress",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub status: ProgressStatus,
    pub processed: u64,
    pub total: u64,
}

impl ProgressEntry {
    pub fn new(status: ProgressStatus, processed: u64, total: u64) -> Self {
        Self {
            status,
            processed,
            total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache entry is malformed: {0}")]
    Malformed(String),
}

#[async_trait::async_trait]
pub trait ProgressCache: Send + Sync {
    /// Overwrite the entry for a job. Last writer wins.
    async fn set(&self, job_id: JobId, entry: ProgressEntry) -> Result<(), CacheError>;

    async fn get(&self, job_id: JobId) -> Result<Option<ProgressEntry>, CacheError>;
}

#[async_trait::async_trait]
impl<T: ProgressCache + ?Sized> ProgressCache for Arc<T> {
    async fn set(&self, job_id: JobId, entry: ProgressEntry) -> Result<(), CacheError> {
        (**self).set(job_id, entry).await
    }

    async fn get(&self, job_id: JobId) -> Result<Option<ProgressEntry>, CacheError> {
        (**self).get(job_id).await
    }
}

/// Best-effort write: failures are logged and swallowed.
pub async fn publish(
    cache: &dyn ProgressCache,
    job_id: JobId,
    status: ProgressStatus,
    processed: u64,
    total: u64,
) {
    let entry = ProgressEntry::new(status, processed, total);
    if let Err(e) = cache.set(job_id, entry).await {
        tracing::warn!(job_id = %job_id, error = %e, "progress cache write failed");
    }
}

/// Cache key for a job.
pub fn cache_key(job_id: JobId) -> String {
    format!("upload:{job_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrying_reads_as_in_progress() {
        assert_eq!(ProgressStatus::Retrying.public_label(), "in_progress");
        assert_eq!(ProgressStatus::InProgress.public_label(), "in_progress");
        assert_eq!(ProgressStatus::Failed.public_label(), "failed");
    }

    #[test]
    fn entry_serializes_compactly() {
        let entry = ProgressEntry::new(ProgressStatus::Retrying, 10, 20);
        let json = serde_json::to_value(entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "retrying", "processed": 10, "total": 20})
        );
    }
}
