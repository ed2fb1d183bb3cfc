//! Core job types and policies.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use catalog_core::JobId;

/// Job kind for routing to the appropriate processing flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// CSV file ingested into the catalog.
    Ingest,
    /// Every catalog row removed in bounded chunks.
    BulkDelete,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Ingest => "product_ingestion",
            JobKind::BulkDelete => "bulk_delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "product_ingestion" => Some(JobKind::Ingest),
            "bulk_delete" => Some(JobKind::BulkDelete),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, not yet picked up.
    Pending,
    /// Picked up by a worker; re-entered on resume.
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Checkpoint record of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub processed_count: u64,
    /// Fixed once it first becomes nonzero.
    pub total_count: u64,
    /// Original upload name (ingest jobs only).
    pub filename: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set on COMPLETED or FAILED.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, kind: JobKind, filename: Option<String>) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Pending,
            processed_count: 0,
            total_count: 0,
            filename,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn progress_percent(&self) -> f64 {
        progress_percent(self.processed_count, self.total_count)
    }
}

/// `processed / total * 100` rounded to two decimals, `0` when `total == 0`.
pub fn progress_percent(processed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = (processed as f64 / total as f64) * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Listing filter for the checkpoint store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub kind: Option<JobKind>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| s == job.status) && self.kind.is_none_or(|k| k == job.kind)
    }
}

/// Where a job reads its work from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "path")]
pub enum WorkSource {
    /// Stored CSV upload.
    CsvFile(PathBuf),
    /// The catalog itself (bulk delete).
    Catalog,
}

/// Queue message handed to the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
    pub kind: JobKind,
    pub source: WorkSource,
    /// Retries already performed for this job (0 on first run).
    pub attempt: u32,
}

impl JobMessage {
    pub fn ingest(job_id: JobId, path: impl Into<PathBuf>) -> Self {
        Self {
            job_id,
            kind: JobKind::Ingest,
            source: WorkSource::CsvFile(path.into()),
            attempt: 0,
        }
    }

    pub fn bulk_delete(job_id: JobId) -> Self {
        Self {
            job_id,
            kind: JobKind::BulkDelete,
            source: WorkSource::Catalog,
            attempt: 0,
        }
    }

    /// Same job, one retry further.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt - 1)
    #[default]
    Exponential,
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first failure (0 = no retries)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_secs(2), Duration::from_secs(60))
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay before retry number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay.min(self.max_delay),
            BackoffStrategy::Exponential => {
                let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay
                    .checked_mul(factor)
                    .unwrap_or(self.max_delay)
                    .min(self.max_delay)
            }
        }
    }

    /// `attempt` is the number of retries already performed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_until_cap() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(60));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(500));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy::default();

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retry().should_retry(0));
    }

    #[test]
    fn percent_is_zero_without_total() {
        assert_eq!(progress_percent(0, 0), 0.0);
        assert_eq!(progress_percent(5, 0), 0.0);
        assert_eq!(progress_percent(1, 3), 33.33);
        assert_eq!(progress_percent(2, 3), 66.67);
        assert_eq!(progress_percent(3, 3), 100.0);
    }

    #[test]
    fn job_starts_pending_with_zero_counters() {
        let job = Job::new(JobId::new(), JobKind::Ingest, Some("p.csv".into()));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.processed_count, 0);
        assert_eq!(job.total_count, 0);
        assert!(job.completed_at.is_none());
        assert_eq!(job.progress_percent(), 0.0);
    }

    #[test]
    fn kind_and_status_names_round_trip() {
        for kind in [JobKind::Ingest, JobKind::BulkDelete] {
            assert_eq!(JobKind::parse(kind.as_str()), Some(kind));
        }
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("in_progress"), None);
    }

    #[test]
    fn next_attempt_keeps_job_identity() {
        let msg = JobMessage::bulk_delete(JobId::new());
        let next = msg.next_attempt();
        assert_eq!(next.job_id, msg.job_id);
        assert_eq!(next.attempt, 1);
        assert_eq!(next.source, WorkSource::Catalog);
    }
}
