//! Job status read path: cache first, checkpoint store second.

use serde::Serialize;
use tracing::warn;

use catalog_core::JobId;

use crate::progress::{ProgressCache, ProgressStatus};

use super::store::{CheckpointError, CheckpointStore};
use super::types::{progress_percent, JobStatus};

/// Public label for a durable status.
pub fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Processing => "in_progress",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub task_id: JobId,
    /// One of `pending`, `in_progress`, `completed`, `failed`.
    pub status: &'static str,
    pub processed_records: u64,
    pub total_records: u64,
    pub progress_percentage: f64,
}

impl JobStatusView {
    pub(crate) fn new(task_id: JobId, status: &'static str, processed: u64, total: u64) -> Self {
        let mut pct = progress_percent(processed, total);
        // Rounding must not report 100 before the job has actually completed.
        if status != "completed" && pct >= 100.0 {
            pct = 99.99;
        }
        Self {
            task_id,
            status,
            processed_records: processed,
            total_records: total,
            progress_percentage: pct,
        }
    }
}

/// Resolve a job's status. `NotFound` when neither source knows the id.
pub async fn read_status(
    cache: &dyn ProgressCache,
    checkpoints: &dyn CheckpointStore,
    job_id: JobId,
) -> Result<JobStatusView, CheckpointError> {
    match cache.get(job_id).await {
        Ok(Some(entry)) => {
            return Ok(JobStatusView::new(
                job_id,
                entry.status.public_label(),
                entry.processed,
                entry.total,
            ));
        }
        Ok(None) => {}
        Err(e) => warn!(job_id = %job_id, error = %e, "progress cache read failed"),
    }

    let job = checkpoints.get(job_id).await?;
    Ok(JobStatusView::new(
        job_id,
        status_label(job.status),
        job.processed_count,
        job.total_count,
    ))
}

/// Cache status equivalent to a durable status.
pub fn progress_status(status: JobStatus) -> ProgressStatus {
    match status {
        JobStatus::Pending => ProgressStatus::Pending,
        JobStatus::Processing => ProgressStatus::InProgress,
        JobStatus::Completed => ProgressStatus::Completed,
        JobStatus::Failed => ProgressStatus::Failed,
    }
}
