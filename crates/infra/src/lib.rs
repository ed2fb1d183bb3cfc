//! Infrastructure layer: job pipeline, stores, cache, webhooks, config.

pub mod catalog;
pub mod config;
pub mod ingest;
pub mod jobs;
pub mod progress;
pub mod schema;
pub mod webhooks;

pub use config::{ConfigError, PipelineConfig, ServerConfig, StorageConfig};
