//! Chunked, resumable job processing.
//!
//! Both job kinds share one state machine: PENDING -> PROCESSING ->
//! {COMPLETED, FAILED}. PROCESSING is re-entrant: a job that is run again
//! resumes from its last checkpoint instead of restarting.
//!
//! Per chunk, the data write is awaited before the checkpoint that claims
//! it, and the cache is written last.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use catalog_core::JobId;
use catalog_events::WebhookEvent;

use crate::catalog::{CatalogError, CatalogStore};
use crate::ingest::csv::{count_data_rows, CsvChunkReader, CsvError};
use crate::progress::{publish, ProgressCache, ProgressStatus};
use crate::webhooks::EventDispatcher;

use super::store::{CheckpointError, CheckpointStore};
use super::types::{Job, JobKind, JobMessage, JobStatus, WorkSource};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error("delete made no progress while {remaining} rows remain")]
    Stalled { remaining: u64 },
    #[error("job {kind} cannot run against {work:?}")]
    InvalidSource { kind: JobKind, work: WorkSource },
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl JobError {
    /// Terminal errors fail the job without consuming retries.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobError::Checkpoint(CheckpointError::NotFound(_))
                | JobError::Csv(CsvError::SourceMissing(_))
                | JobError::Csv(CsvError::MissingColumns(_))
                | JobError::Csv(CsvError::NotUtf8)
                | JobError::Csv(CsvError::Empty)
                | JobError::InvalidSource { .. }
        )
    }
}

/// Result of one processing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Job reached COMPLETED; the event is ready for dispatch.
    Completed(WebhookEvent),
    /// Transient failure; the job may be run again from its checkpoint.
    Retryable(JobError),
    /// The job cannot make progress no matter how often it is retried.
    Terminal(JobError),
    /// The job was already COMPLETED or FAILED; nothing was touched.
    Skipped(JobStatus),
}

impl From<JobError> for StepResult {
    fn from(err: JobError) -> Self {
        if err.is_terminal() {
            StepResult::Terminal(err)
        } else {
            StepResult::Retryable(err)
        }
    }
}

/// Handles passed into every job run.
#[derive(Clone)]
pub struct PipelineDeps {
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub cache: Arc<dyn ProgressCache>,
    pub catalog: Arc<dyn CatalogStore>,
    pub dispatcher: EventDispatcher,
}

/// Drives one job end to end, one chunk at a time.
#[derive(Clone)]
pub struct ChunkedJobProcessor {
    deps: PipelineDeps,
    chunk_size: usize,
    delete_chunk_size: u64,
}

impl ChunkedJobProcessor {
    pub fn new(deps: PipelineDeps, chunk_size: usize, delete_chunk_size: usize) -> Self {
        Self {
            deps,
            chunk_size: chunk_size.max(1),
            delete_chunk_size: delete_chunk_size.max(1) as u64,
        }
    }

    pub fn deps(&self) -> &PipelineDeps {
        &self.deps
    }

    #[instrument(skip(self, message), fields(job_id = %message.job_id, kind = %message.kind, attempt = message.attempt))]
    pub async fn run(&self, message: &JobMessage) -> StepResult {
        let job = match self.deps.checkpoints.get(message.job_id).await {
            Ok(job) => job,
            Err(e) => return JobError::from(e).into(),
        };
        // Finished jobs are never re-entered, whatever the queue delivers.
        if job.status.is_terminal() {
            info!(job_id = %job.id, status = job.status.as_str(), "job already finished, message dropped");
            return StepResult::Skipped(job.status);
        }

        let outcome = match (message.kind, &message.source) {
            (JobKind::Ingest, WorkSource::CsvFile(path)) => self.ingest(job, path.clone()).await,
            (JobKind::BulkDelete, WorkSource::Catalog) => self.bulk_delete(job).await,
            (kind, work) => Err(JobError::InvalidSource {
                kind,
                work: work.clone(),
            }),
        };

        match outcome {
            Ok(event) => StepResult::Completed(event),
            Err(err) => err.into(),
        }
    }

    async fn ingest(&self, job: Job, path: PathBuf) -> Result<WebhookEvent, JobError> {
        let job_id = job.id;

        let total = if job.total_count > 0 {
            job.total_count
        } else {
            let p = path.clone();
            blocking(move || count_data_rows(&p)).await??
        };

        let job = self
            .deps
            .checkpoints
            .mark_processing(job_id, total, job.processed_count)
            .await?;
        let total = job.total_count;
        let resume_from = job.processed_count;
        let mut processed = resume_from;
        self.progress(job_id, ProgressStatus::InProgress, processed, total).await;

        if total == 0 || processed >= total {
            return self
                .complete(job_id, WebhookEvent::ProductUploadComplete {
                    total_products: processed,
                })
                .await;
        }

        if resume_from > 0 {
            info!(job_id = %job_id, resume_from, total, "resuming ingestion");
        }

        let mut reader = open_reader(&path).await?;
        let chunk_size = self.chunk_size;
        // Valid rows seen so far, including those skipped on resume.
        let mut seen = 0u64;

        loop {
            let (returned, next) = blocking(move || {
                let next = reader.next_chunk(chunk_size);
                (reader, next)
            })
            .await?;
            reader = returned;

            let Some(chunk) = next? else {
                break;
            };

            let mut rows = chunk.rows;
            let valid = rows.len() as u64;
            if seen + valid <= resume_from {
                seen += valid;
                continue;
            }
            if seen < resume_from {
                rows.drain(..(resume_from - seen) as usize);
            }
            seen += valid;

            if rows.is_empty() {
                continue;
            }

            let handed = rows.len() as u64;
            self.deps.catalog.bulk_upsert(rows).await?;
            processed = (processed + handed).min(total);
            self.deps
                .checkpoints
                .update_progress(job_id, processed, total)
                .await?;
            self.progress(job_id, ProgressStatus::InProgress, processed, total).await;

            debug!(job_id = %job_id, consumed = chunk.consumed, processed, total, "chunk ingested");
        }

        self.complete(job_id, WebhookEvent::ProductUploadComplete {
            total_products: processed,
        })
        .await
    }

    async fn bulk_delete(&self, job: Job) -> Result<WebhookEvent, JobError> {
        let job_id = job.id;
        let mut remaining = self.deps.catalog.count_all().await?;

        let total = if job.total_count > 0 {
            job.total_count
        } else {
            job.processed_count + remaining
        };
        let job = self
            .deps
            .checkpoints
            .mark_processing(job_id, total, job.processed_count)
            .await?;
        let total = job.total_count;
        let mut processed = job.processed_count;
        self.progress(job_id, ProgressStatus::InProgress, processed, total).await;

        let mut stalled = false;
        while remaining > 0 {
            let deleted = self.deps.catalog.delete_chunk(self.delete_chunk_size).await?;

            if deleted == 0 {
                // Someone else changed the catalog; trust a fresh count.
                if stalled {
                    return Err(JobError::Stalled { remaining });
                }
                remaining = self.deps.catalog.count_all().await?;
                stalled = true;
                continue;
            }
            stalled = false;

            remaining = remaining.saturating_sub(deleted);
            processed = (processed + deleted).min(total);
            self.deps
                .checkpoints
                .update_progress(job_id, processed, total)
                .await?;
            self.progress(job_id, ProgressStatus::InProgress, processed, total).await;

            debug!(job_id = %job_id, deleted, processed, remaining, "chunk deleted");
        }

        self.complete(job_id, WebhookEvent::BulkDeleteComplete {
            deleted_count: processed,
        })
        .await
    }

    async fn complete(&self, job_id: JobId, event: WebhookEvent) -> Result<WebhookEvent, JobError> {
        let job = self.deps.checkpoints.mark_completed(job_id).await?;
        self.progress(
            job_id,
            ProgressStatus::Completed,
            job.processed_count,
            job.total_count,
        )
        .await;
        info!(job_id = %job_id, processed = job.processed_count, total = job.total_count, "job completed");
        Ok(event)
    }

    async fn progress(&self, job_id: JobId, status: ProgressStatus, processed: u64, total: u64) {
        publish(self.deps.cache.as_ref(), job_id, status, processed, total).await;
    }
}

async fn open_reader(path: &Path) -> Result<CsvChunkReader, JobError> {
    let path = path.to_path_buf();
    Ok(blocking(move || CsvChunkReader::open(&path)).await??)
}

/// Run file I/O off the async worker threads.
async fn blocking<F, T>(f: F) -> Result<T, JobError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| JobError::Worker(e.to_string()))
}
