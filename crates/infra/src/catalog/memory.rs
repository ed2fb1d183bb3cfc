use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use catalog_products::{dedup_by_sku, normalize_sku, Product, ProductDraft};

use super::{CatalogError, CatalogStore};

/// In-memory catalog for tests/dev, keyed by normalized SKU.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    products: RwLock<HashMap<String, Product>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn get_by_sku(&self, sku: &str) -> Option<Product> {
        self.products
            .read()
            .ok()
            .and_then(|p| p.get(&normalize_sku(sku)).cloned())
    }

    /// Snapshot of all products, sorted by SKU.
    pub fn all(&self) -> Vec<Product> {
        let mut out: Vec<Product> = self
            .products
            .read()
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| a.sku.cmp(&b.sku));
        out
    }

    fn lock_err() -> CatalogError {
        CatalogError::Storage("catalog lock poisoned".to_string())
    }
}

#[async_trait::async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn bulk_upsert(&self, rows: Vec<ProductDraft>) -> Result<u64, CatalogError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let rows = dedup_by_sku(rows);
        let now = Utc::now();
        let mut products = self.products.write().map_err(|_| Self::lock_err())?;

        for draft in &rows {
            match products.get_mut(&draft.sku) {
                Some(existing) => existing.apply_draft(draft.clone(), now),
                None => {
                    let product = Product::from_draft(draft.clone(), now);
                    products.insert(product.sku.clone(), product);
                }
            }
        }

        Ok(rows.len() as u64)
    }

    async fn count_all(&self) -> Result<u64, CatalogError> {
        Ok(self.products.read().map_err(|_| Self::lock_err())?.len() as u64)
    }

    async fn delete_chunk(&self, limit: u64) -> Result<u64, CatalogError> {
        let mut products = self.products.write().map_err(|_| Self::lock_err())?;
        let victims: Vec<String> = products
            .keys()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        for key in &victims {
            products.remove(key);
        }
        Ok(victims.len() as u64)
    }
}
