//! PostgreSQL-backed checkpoint store (`catalog_jobs` table).

use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use catalog_core::JobId;

use super::store::{clamp_page, CheckpointError, CheckpointStore};
use super::types::{Job, JobFilter, JobKind, JobStatus};

const JOB_COLUMNS: &str =
    "id, kind, status, processed_count, total_count, filename, created_at, completed_at";

/// Checkpoint store on a shared connection pool.
///
/// Every mutation is a single `UPDATE ... RETURNING`, so a record is never
/// observed half-written.
#[derive(Clone)]
pub struct PostgresCheckpointStore {
    pool: Arc<PgPool>,
}

impl PostgresCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn fetch_updated(
        &self,
        operation: &str,
        job_id: JobId,
        sql: &str,
    ) -> Result<Job, CheckpointError> {
        let row = sqlx::query(sql)
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?
            .ok_or(CheckpointError::NotFound(job_id))?;
        row_to_job(&row)
    }
}

#[async_trait::async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    #[instrument(skip(self), err)]
    async fn create(
        &self,
        job_id: JobId,
        kind: JobKind,
        filename: Option<String>,
    ) -> Result<Job, CheckpointError> {
        let job = Job::new(job_id, kind, filename);
        sqlx::query(
            r#"
            INSERT INTO catalog_jobs
                (id, kind, status, processed_count, total_count, filename, created_at)
            VALUES ($1, $2, $3, 0, 0, $4, $5)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.kind.as_str())
        .bind(job.status.as_str())
        .bind(job.filename.as_deref())
        .bind(job.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_create_error(job_id, e))?;
        Ok(job)
    }

    #[instrument(skip(self), err)]
    async fn get(&self, job_id: JobId) -> Result<Job, CheckpointError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM catalog_jobs WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_job", e))?
            .ok_or(CheckpointError::NotFound(job_id))?;
        row_to_job(&row)
    }

    #[instrument(skip(self), err)]
    async fn mark_processing(
        &self,
        job_id: JobId,
        total: u64,
        resume_from: u64,
    ) -> Result<Job, CheckpointError> {
        let sql = format!(
            r#"
            UPDATE catalog_jobs
            SET status = 'processing',
                total_count = CASE WHEN total_count = 0 THEN $2 ELSE total_count END,
                processed_count = LEAST($3, CASE WHEN total_count = 0 THEN $2 ELSE total_count END)
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(job_id.as_uuid())
            .bind(to_db(total))
            .bind(to_db(resume_from))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("mark_processing", e))?
            .ok_or(CheckpointError::NotFound(job_id))?;
        row_to_job(&row)
    }

    #[instrument(skip(self), err)]
    async fn update_progress(
        &self,
        job_id: JobId,
        processed: u64,
        total: u64,
    ) -> Result<(), CheckpointError> {
        let result = sqlx::query(
            r#"
            UPDATE catalog_jobs
            SET total_count = CASE WHEN total_count = 0 THEN $3 ELSE total_count END,
                processed_count = CASE
                    WHEN (CASE WHEN total_count = 0 THEN $3 ELSE total_count END) > 0
                        THEN LEAST($2, CASE WHEN total_count = 0 THEN $3 ELSE total_count END)
                    ELSE $2
                END
            WHERE id = $1
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(to_db(processed))
        .bind(to_db(total))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_progress", e))?;

        if result.rows_affected() == 0 {
            return Err(CheckpointError::NotFound(job_id));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn mark_completed(&self, job_id: JobId) -> Result<Job, CheckpointError> {
        let sql = format!(
            r#"
            UPDATE catalog_jobs
            SET status = 'completed', processed_count = total_count, completed_at = now()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        );
        self.fetch_updated("mark_completed", job_id, &sql).await
    }

    #[instrument(skip(self), err)]
    async fn mark_failed(&self, job_id: JobId, reason: &str) -> Result<Job, CheckpointError> {
        tracing::warn!(job_id = %job_id, reason, "job marked failed");
        let sql = format!(
            r#"
            UPDATE catalog_jobs
            SET status = 'failed', completed_at = now()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        );
        self.fetch_updated("mark_failed", job_id, &sql).await
    }

    #[instrument(skip(self), err)]
    async fn list(
        &self,
        filter: JobFilter,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Job>, u64), CheckpointError> {
        let (page, limit) = clamp_page(page, limit);
        let status = filter.status.map(|s| s.as_str());
        let kind = filter.kind.map(|k| k.as_str());

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM catalog_jobs
            WHERE ($1::text IS NULL OR status = $1)
                AND ($2::text IS NULL OR kind = $2)
            "#,
        )
        .bind(status)
        .bind(kind)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_jobs", e))?;
        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| CheckpointError::Storage(format!("failed to read count: {e}")))?;

        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM catalog_jobs
            WHERE ($1::text IS NULL OR status = $1)
                AND ($2::text IS NULL OR kind = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(status)
            .bind(kind)
            .bind(i64::from(limit))
            .bind(i64::from(page - 1) * i64::from(limit))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_jobs", e))?;

        let jobs = rows.iter().map(row_to_job).collect::<Result<Vec<_>, _>>()?;
        Ok((jobs, total.max(0) as u64))
    }
}

fn to_db(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn row_to_job(row: &PgRow) -> Result<Job, CheckpointError> {
    let read = |e: sqlx::Error| CheckpointError::Storage(format!("failed to decode job row: {e}"));

    let id: uuid::Uuid = row.try_get("id").map_err(read)?;
    let kind: String = row.try_get("kind").map_err(read)?;
    let status: String = row.try_get("status").map_err(read)?;
    let processed: i64 = row.try_get("processed_count").map_err(read)?;
    let total: i64 = row.try_get("total_count").map_err(read)?;

    Ok(Job {
        id: JobId::from_uuid(id),
        kind: JobKind::parse(&kind)
            .ok_or_else(|| CheckpointError::Storage(format!("unknown job kind '{kind}'")))?,
        status: JobStatus::parse(&status)
            .ok_or_else(|| CheckpointError::Storage(format!("unknown job status '{status}'")))?,
        processed_count: processed.max(0) as u64,
        total_count: total.max(0) as u64,
        filename: row.try_get("filename").map_err(read)?,
        created_at: row.try_get("created_at").map_err(read)?,
        completed_at: row.try_get("completed_at").map_err(read)?,
    })
}

/// A duplicate id on insert is `AlreadyExists`; anything else is storage.
fn map_create_error(job_id: JobId, err: sqlx::Error) -> CheckpointError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return CheckpointError::AlreadyExists(job_id);
        }
    }
    map_sqlx_error("create_job", err)
}

/// Map SQLx errors to CheckpointError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> CheckpointError {
    match err {
        sqlx::Error::Database(db_err) => CheckpointError::Storage(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            CheckpointError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => CheckpointError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
