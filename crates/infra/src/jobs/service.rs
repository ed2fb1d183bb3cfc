//! Job submission and query facade used by the HTTP layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{info, warn};

use catalog_core::JobId;

use crate::ingest::csv::{validate_header, CsvError};
use crate::progress::{publish, ProgressCache, ProgressStatus};

use super::executor::{JobQueue, QueueClosed};
use super::status::{progress_status, read_status, JobStatusView};
use super::store::{CheckpointError, CheckpointStore};
use super::types::{Job, JobFilter, JobKind, JobMessage, JobStatus};

/// Bytes buffered while waiting for the header line to end.
const HEADER_SCAN_LIMIT: usize = 64 * 1024;

/// Page size used when scanning for unfinished jobs at startup.
const RESUME_PAGE_SIZE: u32 = 100;

/// Rejections raised before a job exists. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("only .csv files are accepted")]
    NotCsv,
    #[error("invalid csv: {0}")]
    InvalidFile(#[from] CsvError),
    #[error("failed to store upload: {0}")]
    Storage(#[from] std::io::Error),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Queue(#[from] QueueClosed),
}

#[derive(Clone)]
pub struct JobService {
    checkpoints: Arc<dyn CheckpointStore>,
    cache: Arc<dyn ProgressCache>,
    queue: JobQueue,
    upload_dir: PathBuf,
}

impl JobService {
    pub fn new(
        checkpoints: Arc<dyn CheckpointStore>,
        cache: Arc<dyn ProgressCache>,
        queue: JobQueue,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            checkpoints,
            cache,
            queue,
            upload_dir: upload_dir.into(),
        }
    }

    /// Open a new upload for streaming. Nothing is queued until
    /// [`PendingUpload::finish`] succeeds.
    pub async fn begin_upload(&self, filename: &str) -> Result<PendingUpload, SubmissionError> {
        if !Path::new(filename)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        {
            return Err(SubmissionError::NotCsv);
        }

        let job_id = JobId::new();
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let path = self.upload_path(job_id, filename);
        let file = tokio::fs::File::create(&path).await?;

        Ok(PendingUpload {
            service: self.clone(),
            job_id,
            filename: filename.to_string(),
            path,
            writer: Some(BufWriter::new(file)),
            head: Vec::new(),
            header_checked: false,
            bytes: 0,
            committed: false,
        })
    }

    /// Validate and store an in-memory upload, then queue its ingestion.
    pub async fn submit_ingest(
        &self,
        filename: &str,
        contents: &[u8],
    ) -> Result<JobId, SubmissionError> {
        let mut upload = self.begin_upload(filename).await?;
        upload.write(contents).await?;
        upload.finish().await
    }

    pub async fn submit_bulk_delete(&self) -> Result<JobId, SubmissionError> {
        let job_id = JobId::new();
        self.enqueue(job_id, JobKind::BulkDelete, None, JobMessage::bulk_delete(job_id))
            .await?;
        info!(job_id = %job_id, "bulk delete queued");
        Ok(job_id)
    }

    /// Re-queue every PENDING or PROCESSING job left behind by a previous
    /// process. Returns how many were queued.
    ///
    /// Ingest jobs point back at `{upload_dir}/{id}_{name}`; one without a
    /// stored filename cannot be located and is marked FAILED.
    pub async fn resume_unfinished(&self) -> Result<usize, SubmissionError> {
        let mut unfinished = Vec::new();
        for status in [JobStatus::Pending, JobStatus::Processing] {
            let filter = JobFilter {
                status: Some(status),
                kind: None,
            };
            let mut page = 1;
            loop {
                let (jobs, total) = self
                    .checkpoints
                    .list(filter.clone(), page, RESUME_PAGE_SIZE)
                    .await?;
                let last = jobs.is_empty() || u64::from(page) * u64::from(RESUME_PAGE_SIZE) >= total;
                unfinished.extend(jobs);
                if last {
                    break;
                }
                page += 1;
            }
        }

        let mut resumed = 0;
        for job in unfinished {
            let message = match (job.kind, job.filename.as_deref()) {
                (JobKind::BulkDelete, _) => JobMessage::bulk_delete(job.id),
                (JobKind::Ingest, Some(name)) => {
                    JobMessage::ingest(job.id, self.upload_path(job.id, name))
                }
                (JobKind::Ingest, None) => {
                    warn!(job_id = %job.id, "unfinished ingest has no stored upload");
                    self.abandon(job.id, "upload file unknown").await;
                    continue;
                }
            };
            self.queue.submit(message)?;
            resumed += 1;
            info!(
                job_id = %job.id,
                kind = %job.kind,
                status = job.status.as_str(),
                processed = job.processed_count,
                "unfinished job re-queued"
            );
        }

        if resumed > 0 {
            info!(resumed, "resumed unfinished jobs");
        }
        Ok(resumed)
    }

    async fn enqueue(
        &self,
        job_id: JobId,
        kind: JobKind,
        filename: Option<String>,
        message: JobMessage,
    ) -> Result<(), SubmissionError> {
        let job = self.checkpoints.create(job_id, kind, filename).await?;
        publish(
            self.cache.as_ref(),
            job_id,
            progress_status(job.status),
            job.processed_count,
            job.total_count,
        )
        .await;
        if let Err(closed) = self.queue.submit(message) {
            self.abandon(job_id, "job queue is closed").await;
            return Err(closed.into());
        }
        Ok(())
    }

    /// Mark a job FAILED outside the worker pool.
    async fn abandon(&self, job_id: JobId, reason: &str) {
        match self.checkpoints.mark_failed(job_id, reason).await {
            Ok(job) => {
                publish(
                    self.cache.as_ref(),
                    job_id,
                    ProgressStatus::Failed,
                    job.processed_count,
                    job.total_count,
                )
                .await
            }
            Err(e) => warn!(job_id = %job_id, error = %e, "could not record job failure"),
        }
    }

    fn upload_path(&self, job_id: JobId, filename: &str) -> PathBuf {
        self.upload_dir
            .join(format!("{}_{}", job_id, sanitize_filename(filename)))
    }

    pub async fn status(&self, job_id: JobId) -> Result<JobStatusView, CheckpointError> {
        read_status(self.cache.as_ref(), self.checkpoints.as_ref(), job_id).await
    }

    pub async fn list(
        &self,
        filter: JobFilter,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Job>, u64), CheckpointError> {
        self.checkpoints.list(filter, page, limit).await
    }
}

/// An upload being written to disk chunk by chunk.
///
/// The header is checked as soon as its line is complete. Dropping the
/// upload before [`finish`](Self::finish) succeeds deletes the file.
pub struct PendingUpload {
    service: JobService,
    job_id: JobId,
    filename: String,
    path: PathBuf,
    writer: Option<BufWriter<tokio::fs::File>>,
    /// Bytes held back until the header has been validated.
    head: Vec<u8>,
    header_checked: bool,
    bytes: u64,
    committed: bool,
}

impl PendingUpload {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), SubmissionError> {
        self.bytes += chunk.len() as u64;
        if self.header_checked {
            return self.write_through(chunk).await;
        }

        self.head.extend_from_slice(chunk);
        if header_line_complete(&self.head) || self.head.len() >= HEADER_SCAN_LIMIT {
            self.check_header().await?;
        }
        Ok(())
    }

    /// Flush the file, record the job and hand it to the worker pool.
    pub async fn finish(mut self) -> Result<JobId, SubmissionError> {
        if !self.header_checked {
            self.check_header().await?;
        }
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.into_inner().sync_all().await?;
        }

        let job_id = self.job_id;
        let message = JobMessage::ingest(job_id, &self.path);
        self.service
            .enqueue(job_id, JobKind::Ingest, Some(self.filename.clone()), message)
            .await?;
        self.committed = true;
        info!(job_id = %job_id, file = %self.path.display(), bytes = self.bytes, "ingestion queued");
        Ok(job_id)
    }

    async fn check_header(&mut self) -> Result<(), SubmissionError> {
        validate_header(&self.head)?;
        self.header_checked = true;
        let head = std::mem::take(&mut self.head);
        self.write_through(&head).await
    }

    async fn write_through(&mut self, bytes: &[u8]) -> Result<(), SubmissionError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(bytes).await?;
        }
        Ok(())
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.writer.take();
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!(file = %self.path.display(), "discarded rejected upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %self.path.display(), error = %e, "could not remove rejected upload"),
        }
    }
}

/// True once a non-blank line has been terminated.
fn header_line_complete(head: &[u8]) -> bool {
    match head.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(start) => head[start..].contains(&b'\n'),
        None => false,
    }
}

/// Reduce a client-supplied name to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.csv");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload.csv".to_string()
    } else {
        cleaned
    }
}
