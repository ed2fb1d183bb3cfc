//! Checkpoint storage: the durable record of each job's progress.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use catalog_core::JobId;

use super::types::{Job, JobFilter, JobKind, JobStatus};

/// Checkpoint store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckpointError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Durable, queryable record of job progress.
///
/// Only the job processor mutates a record after `create`; every job has a
/// single writer.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Insert a PENDING record with zero counters.
    async fn create(
        &self,
        job_id: JobId,
        kind: JobKind,
        filename: Option<String>,
    ) -> Result<Job, CheckpointError>;

    async fn get(&self, job_id: JobId) -> Result<Job, CheckpointError>;

    /// Enter PROCESSING. `total` is stored only if no nonzero total exists
    /// yet; `processed_count` becomes `min(resume_from, total_count)`.
    async fn mark_processing(
        &self,
        job_id: JobId,
        total: u64,
        resume_from: u64,
    ) -> Result<Job, CheckpointError>;

    async fn update_progress(
        &self,
        job_id: JobId,
        processed: u64,
        total: u64,
    ) -> Result<(), CheckpointError>;

    /// COMPLETED with `processed_count = total_count`.
    async fn mark_completed(&self, job_id: JobId) -> Result<Job, CheckpointError>;

    /// FAILED. `reason` is logged, not persisted.
    async fn mark_failed(&self, job_id: JobId, reason: &str) -> Result<Job, CheckpointError>;

    /// One page of jobs, newest first, plus the total number of matches.
    async fn list(
        &self,
        filter: JobFilter,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Job>, u64), CheckpointError>;
}

/// Apply the `mark_processing` rules to a record.
pub(crate) fn apply_processing(job: &mut Job, total: u64, resume_from: u64) {
    job.status = JobStatus::Processing;
    if job.total_count == 0 {
        job.total_count = total;
    }
    job.processed_count = resume_from.min(job.total_count);
}

/// Apply a progress update, keeping `processed <= total` once total is known.
pub(crate) fn apply_progress(job: &mut Job, processed: u64, total: u64) {
    if job.total_count == 0 {
        job.total_count = total;
    }
    job.processed_count = if job.total_count > 0 {
        processed.min(job.total_count)
    } else {
        processed
    };
}

/// Clamp pagination input: `page >= 1`, `limit` in `1..=100`.
pub fn clamp_page(page: u32, limit: u32) -> (u32, u32) {
    (page.max(1), limit.clamp(1, 100))
}

/// In-memory checkpoint store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Overwrite a record wholesale (used to stage resumed jobs in tests).
    pub fn put(&self, job: Job) -> Result<(), CheckpointError> {
        self.write()?.insert(job.id, job);
        Ok(())
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<JobId, Job>>, CheckpointError> {
        self.jobs
            .write()
            .map_err(|_| CheckpointError::Storage("checkpoint lock poisoned".to_string()))
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<JobId, Job>>, CheckpointError> {
        self.jobs
            .read()
            .map_err(|_| CheckpointError::Storage("checkpoint lock poisoned".to_string()))
    }

    fn modify<F>(&self, job_id: JobId, f: F) -> Result<Job, CheckpointError>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.write()?;
        let job = jobs.get_mut(&job_id).ok_or(CheckpointError::NotFound(job_id))?;
        f(job);
        Ok(job.clone())
    }
}

#[async_trait::async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn create(
        &self,
        job_id: JobId,
        kind: JobKind,
        filename: Option<String>,
    ) -> Result<Job, CheckpointError> {
        let mut jobs = self.write()?;
        if jobs.contains_key(&job_id) {
            return Err(CheckpointError::AlreadyExists(job_id));
        }
        let job = Job::new(job_id, kind, filename);
        jobs.insert(job_id, job.clone());
        Ok(job)
    }

    async fn get(&self, job_id: JobId) -> Result<Job, CheckpointError> {
        self.read()?
            .get(&job_id)
            .cloned()
            .ok_or(CheckpointError::NotFound(job_id))
    }

    async fn mark_processing(
        &self,
        job_id: JobId,
        total: u64,
        resume_from: u64,
    ) -> Result<Job, CheckpointError> {
        self.modify(job_id, |job| apply_processing(job, total, resume_from))
    }

    async fn update_progress(
        &self,
        job_id: JobId,
        processed: u64,
        total: u64,
    ) -> Result<(), CheckpointError> {
        self.modify(job_id, |job| apply_progress(job, processed, total))
            .map(|_| ())
    }

    async fn mark_completed(&self, job_id: JobId) -> Result<Job, CheckpointError> {
        self.modify(job_id, |job| {
            job.status = JobStatus::Completed;
            job.processed_count = job.total_count;
            job.completed_at = Some(Utc::now());
        })
    }

    async fn mark_failed(&self, job_id: JobId, reason: &str) -> Result<Job, CheckpointError> {
        tracing::warn!(job_id = %job_id, reason, "job marked failed");
        self.modify(job_id, |job| {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
        })
    }

    async fn list(
        &self,
        filter: JobFilter,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Job>, u64), CheckpointError> {
        let (page, limit) = clamp_page(page, limit);
        let jobs = self.read()?;

        let mut matching: Vec<Job> = jobs.values().filter(|j| filter.matches(j)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let offset = (page as usize - 1) * limit as usize;
        let page_items = matching.into_iter().skip(offset).take(limit as usize).collect();
        Ok((page_items, total))
    }
}

#[async_trait::async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    async fn create(
        &self,
        job_id: JobId,
        kind: JobKind,
        filename: Option<String>,
    ) -> Result<Job, CheckpointError> {
        (**self).create(job_id, kind, filename).await
    }

    async fn get(&self, job_id: JobId) -> Result<Job, CheckpointError> {
        (**self).get(job_id).await
    }

    async fn mark_processing(
        &self,
        job_id: JobId,
        total: u64,
        resume_from: u64,
    ) -> Result<Job, CheckpointError> {
        (**self).mark_processing(job_id, total, resume_from).await
    }

    async fn update_progress(
        &self,
        job_id: JobId,
        processed: u64,
        total: u64,
    ) -> Result<(), CheckpointError> {
        (**self).update_progress(job_id, processed, total).await
    }

    async fn mark_completed(&self, job_id: JobId) -> Result<Job, CheckpointError> {
        (**self).mark_completed(job_id).await
    }

    async fn mark_failed(&self, job_id: JobId, reason: &str) -> Result<Job, CheckpointError> {
        (**self).mark_failed(job_id, reason).await
    }

    async fn list(
        &self,
        filter: JobFilter,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Job>, u64), CheckpointError> {
        (**self).list(filter, page, limit).await
    }
}
