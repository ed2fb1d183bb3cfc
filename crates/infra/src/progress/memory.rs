use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use catalog_core::JobId;

use super::{CacheError, ProgressCache, ProgressEntry};

/// In-memory progress cache for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryProgressCache {
    entries: RwLock<HashMap<JobId, ProgressEntry>>,
}

impl InMemoryProgressCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Drop an entry, simulating expiry or eviction.
    pub fn evict(&self, job_id: JobId) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&job_id);
        }
    }
}

#[async_trait::async_trait]
impl ProgressCache for InMemoryProgressCache {
    async fn set(&self, job_id: JobId, entry: ProgressEntry) -> Result<(), CacheError> {
        self.entries
            .write()
            .map_err(|_| CacheError::Backend("cache lock poisoned".to_string()))?
            .insert(job_id, entry);
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Option<ProgressEntry>, CacheError> {
        Ok(self
            .entries
            .read()
            .map_err(|_| CacheError::Backend("cache lock poisoned".to_string()))?
            .get(&job_id)
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressStatus;

    #[tokio::test]
    async fn last_write_wins() {
        let cache = InMemoryProgressCache::new();
        let id = JobId::new();

        assert_eq!(cache.get(id).await.unwrap(), None);

        cache
            .set(id, ProgressEntry::new(ProgressStatus::InProgress, 1, 10))
            .await
            .unwrap();
        cache
            .set(id, ProgressEntry::new(ProgressStatus::InProgress, 5, 10))
            .await
            .unwrap();
        assert_eq!(cache.get(id).await.unwrap().unwrap().processed, 5);

        cache.evict(id);
        assert_eq!(cache.get(id).await.unwrap(), None);
    }
}
