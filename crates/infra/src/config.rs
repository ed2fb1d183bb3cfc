//! Configuration loading and representation.
//!
//! Everything is read from environment variables once at startup. Unset
//! variables fall back to defaults; set-but-invalid values are an error.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::jobs::types::RetryPolicy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
    #[error("missing required variable {0}")]
    Missing(&'static str),
}

/// Tunables for the job pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Rows read per ingestion chunk.
    pub chunk_size: usize,
    /// Rows removed per bulk-delete step.
    pub delete_chunk_size: usize,
    /// Retries allowed after the first failed attempt.
    pub max_retries: u32,
    /// Upper bound on the backoff delay.
    pub max_retry_delay: Duration,
    /// Per-request timeout for webhook deliveries.
    pub webhook_timeout: Duration,
    /// Directory where accepted uploads are stored.
    pub upload_dir: PathBuf,
    /// Worker pool size.
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10_000,
            delete_chunk_size: 10_000,
            max_retries: 3,
            max_retry_delay: Duration::from_secs(60),
            webhook_timeout: Duration::from_secs(30),
            upload_dir: PathBuf::from("/tmp/uploads"),
            workers: 4,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map instead of the
    /// process environment).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        Ok(Self {
            chunk_size: positive(&lookup, "CATALOG_CHUNK_SIZE", d.chunk_size)?,
            delete_chunk_size: positive(&lookup, "CATALOG_DELETE_CHUNK_SIZE", d.delete_chunk_size)?,
            max_retries: parse_or(&lookup, "CATALOG_MAX_RETRIES", d.max_retries)?,
            max_retry_delay: Duration::from_secs(parse_or(
                &lookup,
                "CATALOG_MAX_RETRY_DELAY_SECS",
                d.max_retry_delay.as_secs(),
            )?),
            webhook_timeout: Duration::from_secs(parse_or(
                &lookup,
                "CATALOG_WEBHOOK_TIMEOUT_SECS",
                d.webhook_timeout.as_secs(),
            )?),
            upload_dir: lookup("CATALOG_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.upload_dir),
            workers: positive(&lookup, "CATALOG_WORKERS", d.workers)?,
        })
    }

    /// Retry policy derived from these settings: `min(cap, 2^attempt)` seconds.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_retries, Duration::from_secs(2), self.max_retry_delay)
    }
}

/// Where the durable stores live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    InMemory,
    Persistent {
        database_url: String,
        redis_url: String,
    },
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let persistent: bool = parse_or(&lookup, "USE_PERSISTENT_STORES", false)?;
        if !persistent {
            return Ok(StorageConfig::InMemory);
        }

        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let redis_url =
            lookup("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string());
        Ok(StorageConfig::Persistent {
            database_url,
            redis_url,
        })
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Request body cap for uploads, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_upload_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let max_upload_mb = positive(&lookup, "CATALOG_MAX_UPLOAD_MB", d.max_upload_bytes >> 20)?;
        Ok(Self {
            bind_addr: parse_or(&lookup, "BIND_ADDR", d.bind_addr)?,
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
        })
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

fn positive<F>(lookup: &F, var: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, var, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: "0".to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.chunk_size, 10_000);
        assert_eq!(cfg.max_retries, 3);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = PipelineConfig::from_lookup(lookup(&[
            ("CATALOG_CHUNK_SIZE", "500"),
            ("CATALOG_MAX_RETRIES", "5"),
            ("CATALOG_UPLOAD_DIR", "/var/uploads"),
        ]))
        .unwrap();
        assert_eq!(cfg.chunk_size, 500);
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.upload_dir, PathBuf::from("/var/uploads"));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("CATALOG_WORKERS", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "CATALOG_WORKERS", .. }));

        let err = PipelineConfig::from_lookup(lookup(&[("CATALOG_CHUNK_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "CATALOG_CHUNK_SIZE", .. }));
    }

    #[test]
    fn persistent_storage_requires_database_url() {
        assert_eq!(
            StorageConfig::from_lookup(lookup(&[])).unwrap(),
            StorageConfig::InMemory
        );
        let err =
            StorageConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "true")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));

        let cfg = StorageConfig::from_lookup(lookup(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/catalog"),
        ]))
        .unwrap();
        assert!(matches!(cfg, StorageConfig::Persistent { redis_url, .. } if redis_url == "redis://localhost:6379"));
    }

    #[test]
    fn server_config_parses_bind_and_upload_cap() {
        let cfg = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.max_upload_bytes, 1024 * 1024 * 1024);

        let cfg = ServerConfig::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("CATALOG_MAX_UPLOAD_MB", "5"),
        ]))
        .unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.max_upload_bytes, 5 * 1024 * 1024);

        let err = ServerConfig::from_lookup(lookup(&[("BIND_ADDR", "nowhere")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "BIND_ADDR", .. }));
    }
}
