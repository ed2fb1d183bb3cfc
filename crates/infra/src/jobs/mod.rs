//! Resumable background jobs: checkpoints, chunked processing, retry and the
//! worker pool.
//!
//! ## Flow
//!
//! - Submission creates a PENDING checkpoint, seeds the progress cache and
//!   queues a `JobMessage`
//! - A worker runs the message through `ChunkedJobProcessor`
//! - The `RetryController` turns a failed run into a delayed re-queue or a
//!   terminal FAILED
//! - Completion hands the event to the webhook dispatcher

pub mod executor;
pub mod postgres;
pub mod processor;
pub mod retry;
pub mod service;
pub mod status;
pub mod store;
pub mod types;

pub use executor::{
    ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobOutcome, JobQueue,
    QueueClosed,
};
pub use postgres::PostgresCheckpointStore;
pub use processor::{ChunkedJobProcessor, JobError, PipelineDeps, StepResult};
pub use retry::{RetryController, RetryDecision};
pub use service::{JobService, PendingUpload, SubmissionError};
pub use status::{read_status, JobStatusView};
pub use store::{CheckpointError, CheckpointStore, InMemoryCheckpointStore};
pub use types::{
    progress_percent, BackoffStrategy, Job, JobFilter, JobKind, JobMessage, JobStatus,
    RetryPolicy, WorkSource,
};
