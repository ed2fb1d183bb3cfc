use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use catalog_core::JobId;
use catalog_infra::jobs::{status::status_label, Job, JobStatusView};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BulkDeleteQuery {
    #[serde(default)]
    pub confirm: bool,
}

// -------------------------
// Response DTOs
// -------------------------

/// Envelope used by the task and bulk-delete endpoints.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub message: &'static str,
    pub results: T,
}

impl<T> ApiResponse<T> {
    pub fn new(message: &'static str, results: T) -> Self {
        Self { message, results }
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub data: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct TaskAccepted {
    pub task_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct TaskDto {
    pub id: JobId,
    pub task_type: &'static str,
    pub filename: Option<String>,
    pub status: &'static str,
    pub processed_records: u64,
    pub total_records: u64,
    pub progress_percentage: f64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for TaskDto {
    fn from(job: Job) -> Self {
        let progress_percentage = job.progress_percent();
        Self {
            id: job.id,
            task_type: job.kind.as_str(),
            filename: job.filename,
            status: status_label(job.status),
            processed_records: job.processed_count,
            total_records: job.total_count,
            progress_percentage,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// Compact status shape returned by `GET /api/tasks/:task_id`.
#[derive(Debug, Serialize)]
pub struct TaskStatusDto {
    pub task_id: JobId,
    pub status: &'static str,
    pub progress: f64,
    pub processed_records: u64,
    pub total_records: u64,
}

impl From<JobStatusView> for TaskStatusDto {
    fn from(view: JobStatusView) -> Self {
        Self {
            task_id: view.task_id,
            status: view.status,
            progress: view.progress_percentage,
            processed_records: view.processed_records,
            total_records: view.total_records,
        }
    }
}
