//! `catalog-core`: shared building blocks for the catalog job pipeline.
//!
//! Pure types only (identifiers, domain errors). No IO.

pub mod error;
pub mod id;

pub use error::DomainError;
pub use id::{JobId, ProductId, WebhookId};
