use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use catalog_core::ProductId;

/// Normalize a SKU to its business-key form (trimmed, lower-cased).
///
/// Uniqueness in the catalog is defined on this form.
pub fn normalize_sku(sku: &str) -> String {
    sku.trim().to_lowercase()
}

/// A product row about to be written by a batch upsert.
///
/// Built from one CSV record. `sku` is kept as provided; stores normalize it
/// with [`normalize_sku`] before writing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub sku: String,
    pub description: String,
    pub active: bool,
}

impl ProductDraft {
    /// Build a draft from raw field values.
    ///
    /// Returns `None` when `name` or `sku` is blank after trimming; such rows
    /// are dropped from ingestion.
    pub fn from_fields(name: &str, sku: &str, description: &str) -> Option<Self> {
        let name = name.trim();
        let sku = sku.trim();
        if name.is_empty() || sku.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            sku: sku.to_string(),
            description: description.trim().to_string(),
            active: true,
        })
    }

    /// Business key of this row.
    pub fn key(&self) -> String {
        normalize_sku(&self.sku)
    }
}

/// Collapse a batch to one row per business key, keeping the **last**
/// occurrence of each key.
///
/// Output order follows the first appearance of each key. SKUs in the output
/// are normalized.
pub fn dedup_by_sku<I>(rows: I) -> Vec<ProductDraft>
where
    I: IntoIterator<Item = ProductDraft>,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<ProductDraft> = Vec::new();

    for mut row in rows {
        let key = row.key();
        row.sku = key.clone();
        match positions.get(&key) {
            Some(&idx) => out[idx] = row,
            None => {
                positions.insert(key, out.len());
                out.push(row);
            }
        }
    }

    out
}

/// A stored catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Normalized business key.
    pub sku: String,
    pub description: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Materialize a new product from a draft.
    pub fn from_draft(draft: ProductDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: ProductId::new(),
            sku: normalize_sku(&draft.sku),
            name: draft.name,
            description: draft.description,
            active: draft.active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the mutable fields from a draft with the same key.
    ///
    /// The key, id and `created_at` are left untouched.
    pub fn apply_draft(&mut self, draft: ProductDraft, now: DateTime<Utc>) {
        self.name = draft.name;
        self.description = draft.description;
        self.active = draft.active;
        self.updated_at = now;
    }
}
