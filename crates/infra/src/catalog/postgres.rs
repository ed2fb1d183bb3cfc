//! PostgreSQL-backed catalog (`products` table, unique index on `lower(sku)`).

use std::sync::Arc;

use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use catalog_core::ProductId;
use catalog_products::{dedup_by_sku, ProductDraft};

use super::{CatalogError, CatalogStore};

#[derive(Clone)]
pub struct PostgresCatalogStore {
    pool: Arc<PgPool>,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl CatalogStore for PostgresCatalogStore {
    #[instrument(skip(self, rows), fields(rows = rows.len()), err)]
    async fn bulk_upsert(&self, rows: Vec<ProductDraft>) -> Result<u64, CatalogError> {
        if rows.is_empty() {
            return Ok(0);
        }

        // One statement per batch; a batch must not hit the same key twice.
        let rows = dedup_by_sku(rows);
        let n = rows.len();
        let mut ids: Vec<Uuid> = Vec::with_capacity(n);
        let mut names: Vec<String> = Vec::with_capacity(n);
        let mut skus: Vec<String> = Vec::with_capacity(n);
        let mut descriptions: Vec<String> = Vec::with_capacity(n);
        let mut actives: Vec<bool> = Vec::with_capacity(n);
        for row in rows {
            ids.push(ProductId::new().into());
            names.push(row.name);
            skus.push(row.sku);
            descriptions.push(row.description);
            actives.push(row.active);
        }

        sqlx::query(
            r#"
            INSERT INTO products (id, name, sku, description, active, created_at, updated_at)
            SELECT id, name, sku, description, active, now(), now()
            FROM UNNEST($1::uuid[], $2::text[], $3::text[], $4::text[], $5::bool[])
                AS t(id, name, sku, description, active)
            ON CONFLICT ((lower(sku))) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                active = EXCLUDED.active,
                updated_at = now()
            "#,
        )
        .bind(&ids)
        .bind(&names)
        .bind(&skus)
        .bind(&descriptions)
        .bind(&actives)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("bulk_upsert", e))?;

        Ok(n as u64)
    }

    #[instrument(skip(self), err)]
    async fn count_all(&self) -> Result<u64, CatalogError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM products")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_products", e))?;
        let total: i64 = row
            .try_get("total")
            .map_err(|e| CatalogError::Storage(format!("failed to read count: {e}")))?;
        Ok(total.max(0) as u64)
    }

    #[instrument(skip(self), err)]
    async fn delete_chunk(&self, limit: u64) -> Result<u64, CatalogError> {
        let result = sqlx::query(
            r#"
            DELETE FROM products
            WHERE id IN (SELECT id FROM products LIMIT $1)
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_chunk", e))?;
        Ok(result.rows_affected())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> CatalogError {
    match err {
        sqlx::Error::Database(db_err) => {
            CatalogError::Storage(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            CatalogError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => CatalogError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
