//! Worker pool that runs queued jobs with retry and backoff.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use catalog_events::WebhookEvent;

use crate::progress::{publish, ProgressStatus};
use crate::webhooks::DispatchReport;

use super::processor::{ChunkedJobProcessor, JobError, StepResult};
use super::retry::{RetryController, RetryDecision};
use super::types::{JobMessage, JobStatus};

/// Job executor configuration.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Name for logging
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            name: "catalog-jobs".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job queue is closed")]
pub struct QueueClosed;

/// Submission side of the worker pool.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<JobMessage>,
}

impl JobQueue {
    /// A queue drained by the caller instead of a worker pool.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<JobMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn submit(&self, message: JobMessage) -> Result<(), QueueClosed> {
        self.tx.send(message).map_err(|_| QueueClosed)
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub retries_scheduled: u64,
    pub jobs_skipped: u64,
    pub current_running: usize,
    pub uptime_secs: u64,
}

#[derive(Debug)]
struct StatsCounters {
    started: Instant,
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    skipped: AtomicU64,
    running: AtomicUsize,
}

impl StatsCounters {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            processed: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            running: AtomicUsize::new(0),
        }
    }

    fn record(&self, outcome: &JobOutcome) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            JobOutcome::Completed { .. } => &self.succeeded,
            JobOutcome::RetryScheduled { .. } => &self.retries,
            JobOutcome::Failed(_) => &self.failed,
            JobOutcome::Skipped(_) => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ExecutorStats {
        ExecutorStats {
            jobs_processed: self.processed.load(Ordering::Relaxed),
            jobs_succeeded: self.succeeded.load(Ordering::Relaxed),
            jobs_failed: self.failed.load(Ordering::Relaxed),
            retries_scheduled: self.retries.load(Ordering::Relaxed),
            jobs_skipped: self.skipped.load(Ordering::Relaxed),
            current_running: self.running.load(Ordering::Relaxed),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}

/// Result of executing one queued message.
#[derive(Debug)]
pub enum JobOutcome {
    /// Job completed; webhook fan-out runs in the background.
    Completed {
        event: WebhookEvent,
        dispatch: JoinHandle<DispatchReport>,
    },
    /// Job failed transiently and should be re-queued after `delay`.
    RetryScheduled { delay: Duration, message: JobMessage },
    /// Job marked FAILED.
    Failed(JobError),
    /// Message for a job that had already finished; dropped.
    Skipped(JobStatus),
}

/// Handle to control a running executor.
#[derive(Debug)]
pub struct JobExecutorHandle {
    queue: JobQueue,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<StatsCounters>,
}

impl JobExecutorHandle {
    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.snapshot()
    }

    /// Stop taking new messages and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Background job executor.
#[derive(Clone)]
pub struct JobExecutor {
    processor: ChunkedJobProcessor,
    retry: RetryController,
}

impl JobExecutor {
    pub fn new(processor: ChunkedJobProcessor, retry: RetryController) -> Self {
        Self { processor, retry }
    }

    /// Spawn the worker pool on the current tokio runtime.
    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle {
        let (tx, rx) = mpsc::unbounded_channel::<JobMessage>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let rx = Arc::new(Mutex::new(rx));
        let stats = Arc::new(StatsCounters::new());
        let queue = JobQueue { tx };

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    self.clone(),
                    format!("{}-{}", config.name, worker),
                    rx.clone(),
                    queue.clone(),
                    shutdown_rx.clone(),
                    stats.clone(),
                ))
            })
            .collect();

        info!(executor = %config.name, workers = config.workers, "job executor started");
        JobExecutorHandle {
            queue,
            shutdown: shutdown_tx,
            workers,
            stats,
        }
    }

    /// Execute a single message and apply its outcome to the checkpoint
    /// store and cache. Re-queueing a scheduled retry is left to the caller.
    pub async fn execute_one(&self, message: &JobMessage) -> JobOutcome {
        let deps = self.processor.deps();
        let result = self.processor.run(message).await;

        let decision = match result {
            StepResult::Completed(event) => {
                let dispatcher = deps.dispatcher.clone();
                let dispatched = event.clone();
                let dispatch = tokio::spawn(async move { dispatcher.dispatch(dispatched).await });
                return JobOutcome::Completed { event, dispatch };
            }
            StepResult::Skipped(status) => return JobOutcome::Skipped(status),
            other => self.retry.decide(message, other),
        };

        match decision {
            Some(RetryDecision::Retry { delay, message: next }) => {
                let (processed, total) = match deps.checkpoints.get(message.job_id).await {
                    Ok(job) => (job.processed_count, job.total_count),
                    Err(_) => (0, 0),
                };
                publish(deps.cache.as_ref(), message.job_id, ProgressStatus::Retrying, processed, total)
                    .await;
                warn!(
                    job_id = %message.job_id,
                    attempt = next.attempt,
                    delay_secs = delay.as_secs(),
                    "job run failed, retry scheduled"
                );
                JobOutcome::RetryScheduled {
                    delay,
                    message: next,
                }
            }
            Some(RetryDecision::Fail { error }) => {
                error!(job_id = %message.job_id, attempt = message.attempt, error = %error, "job failed");
                match deps.checkpoints.mark_failed(message.job_id, &error.to_string()).await {
                    Ok(job) => {
                        publish(
                            deps.cache.as_ref(),
                            job.id,
                            ProgressStatus::Failed,
                            job.processed_count,
                            job.total_count,
                        )
                        .await
                    }
                    Err(e) => {
                        error!(job_id = %message.job_id, error = %e, "could not record job failure")
                    }
                }
                JobOutcome::Failed(error)
            }
            // Unreachable: `decide` only returns `None` for completed runs.
            None => JobOutcome::Failed(JobError::Worker("no retry decision".to_string())),
        }
    }
}

async fn worker_loop(
    executor: JobExecutor,
    name: String,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<JobMessage>>>,
    queue: JobQueue,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<StatsCounters>,
) {
    debug!(worker = %name, "worker started");

    loop {
        let message = tokio::select! {
            _ = shutdown.changed() => break,
            message = async { rx.lock().await.recv().await } => match message {
                Some(m) => m,
                None => break,
            },
        };

        debug!(worker = %name, job_id = %message.job_id, attempt = message.attempt, "picked up job");
        stats.running.fetch_add(1, Ordering::Relaxed);
        let outcome = executor.execute_one(&message).await;
        stats.running.fetch_sub(1, Ordering::Relaxed);
        stats.record(&outcome);

        if let JobOutcome::RetryScheduled { delay, message } = outcome {
            let queue = queue.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if queue.submit(message.clone()).is_err() {
                    warn!(job_id = %message.job_id, "queue closed before retry could run");
                }
            });
        }
    }

    debug!(worker = %name, "worker stopped");
}
