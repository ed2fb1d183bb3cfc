//! Product catalog domain module.
//!
//! Row shapes, SKU normalization and batch dedup rules shared by every
//! catalog store implementation (no IO, no HTTP, no storage).

pub mod product;

pub use product::{Product, ProductDraft, dedup_by_sku, normalize_sku};
