//! Idempotent PostgreSQL schema bootstrap.

use sqlx::PgPool;
use tracing::info;

#[derive(Debug, thiserror::Error)]
#[error("failed to apply schema step '{step}': {source}")]
pub struct SchemaError {
    pub step: &'static str,
    #[source]
    pub source: sqlx::Error,
}

const STEPS: &[(&str, &str)] = &[
    (
        "products",
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id          UUID PRIMARY KEY,
            name        TEXT NOT NULL,
            sku         TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            active      BOOLEAN NOT NULL DEFAULT TRUE,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    ),
    (
        "products_sku_lower_idx",
        "CREATE UNIQUE INDEX IF NOT EXISTS products_sku_lower_idx ON products (lower(sku))",
    ),
    (
        "catalog_jobs",
        r#"
        CREATE TABLE IF NOT EXISTS catalog_jobs (
            id              UUID PRIMARY KEY,
            kind            TEXT NOT NULL,
            status          TEXT NOT NULL,
            processed_count BIGINT NOT NULL DEFAULT 0,
            total_count     BIGINT NOT NULL DEFAULT 0,
            filename        TEXT NULL,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
            completed_at    TIMESTAMPTZ NULL
        )
        "#,
    ),
    (
        "catalog_jobs_created_idx",
        "CREATE INDEX IF NOT EXISTS catalog_jobs_created_idx ON catalog_jobs (created_at DESC)",
    ),
    (
        "webhooks",
        r#"
        CREATE TABLE IF NOT EXISTS webhooks (
            id         UUID PRIMARY KEY,
            name       TEXT NOT NULL,
            url        TEXT NOT NULL,
            event_type TEXT NOT NULL,
            is_active  BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    ),
    (
        "webhooks_event_idx",
        "CREATE INDEX IF NOT EXISTS webhooks_event_idx ON webhooks (event_type) WHERE is_active",
    ),
];

/// Create every table and index the pipeline needs if missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), SchemaError> {
    for (step, sql) in STEPS {
        sqlx::query(sql)
            .execute(pool)
            .await
            .map_err(|source| SchemaError { step, source })?;
    }
    info!(steps = STEPS.len(), "database schema ready");
    Ok(())
}
