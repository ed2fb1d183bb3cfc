//! Redis-backed progress cache.
//!
//! Each job is one JSON string under `upload:{job_id}`. Entries expire after a
//! day so abandoned jobs do not accumulate.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use catalog_core::JobId;

use super::{cache_key, CacheError, ProgressCache, ProgressEntry};

const ENTRY_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Clone)]
pub struct RedisProgressCache {
    conn: ConnectionManager,
}

impl RedisProgressCache {
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait::async_trait]
impl ProgressCache for RedisProgressCache {
    async fn set(&self, job_id: JobId, entry: ProgressEntry) -> Result<(), CacheError> {
        let payload =
            serde_json::to_string(&entry).map_err(|e| CacheError::Malformed(e.to_string()))?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(cache_key(job_id), payload, ENTRY_TTL_SECS)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Option<ProgressEntry>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(cache_key(job_id))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        raw.map(|s| serde_json::from_str(&s).map_err(|e| CacheError::Malformed(e.to_string())))
            .transpose()
    }
}
