//! Retry/backoff decisions for failed job runs.

use std::time::Duration;

use super::processor::{JobError, StepResult};
use super::types::{JobMessage, RetryPolicy};

/// What to do with a failed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-run `message` after `delay`.
    Retry { delay: Duration, message: JobMessage },
    /// Give up; the job is marked FAILED with `error`.
    Fail { error: JobError },
}

#[derive(Debug, Clone, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Decide the follow-up for a non-successful run, `None` when there is
    /// nothing left to do.
    pub fn decide(&self, message: &JobMessage, result: StepResult) -> Option<RetryDecision> {
        match result {
            StepResult::Completed(_) | StepResult::Skipped(_) => None,
            StepResult::Terminal(error) => Some(RetryDecision::Fail { error }),
            StepResult::Retryable(error) => {
                if self.policy.should_retry(message.attempt) {
                    let next = message.next_attempt();
                    Some(RetryDecision::Retry {
                        delay: self.policy.delay_for_attempt(next.attempt),
                        message: next,
                    })
                } else {
                    Some(RetryDecision::Fail { error })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::JobId;
    use catalog_events::WebhookEvent;

    use crate::catalog::CatalogError;
    use crate::ingest::csv::CsvError;

    fn transient() -> StepResult {
        StepResult::Retryable(JobError::Catalog(CatalogError::Storage("timeout".into())))
    }

    #[test]
    fn retries_with_growing_delay_until_exhausted() {
        let controller = RetryController::default();
        let mut message = JobMessage::bulk_delete(JobId::new());
        let mut delays = Vec::new();

        while let Some(RetryDecision::Retry { delay, message: next }) =
            controller.decide(&message, transient())
        {
            delays.push(delay);
            message = next;
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
        assert_eq!(message.attempt, 3);
        assert!(matches!(
            controller.decide(&message, transient()),
            Some(RetryDecision::Fail { .. })
        ));
    }

    #[test]
    fn terminal_errors_skip_retries() {
        let controller = RetryController::default();
        let message = JobMessage::ingest(JobId::new(), "/tmp/x.csv");
        let decision = controller.decide(
            &message,
            StepResult::Terminal(JobError::Csv(CsvError::SourceMissing("/tmp/x.csv".into()))),
        );
        assert!(matches!(decision, Some(RetryDecision::Fail { .. })));
    }

    #[test]
    fn success_needs_no_decision() {
        let controller = RetryController::default();
        let message = JobMessage::bulk_delete(JobId::new());
        let done = StepResult::Completed(WebhookEvent::BulkDeleteComplete { deleted_count: 0 });
        assert_eq!(controller.decide(&message, done), None);
        let skipped = StepResult::Skipped(crate::jobs::types::JobStatus::Failed);
        assert_eq!(controller.decide(&message, skipped), None);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: attempts never exceed the cap and delays are
            /// non-decreasing and capped.
            #[test]
            fn delays_are_bounded(max in 0u32..10, cap_secs in 1u64..120) {
                let policy = RetryPolicy::exponential(
                    max,
                    Duration::from_secs(2),
                    Duration::from_secs(cap_secs),
                );
                let controller = RetryController::new(policy);
                let mut message = JobMessage::bulk_delete(JobId::new());
                let mut last = Duration::ZERO;
                let mut retries = 0;

                while let Some(RetryDecision::Retry { delay, message: next }) =
                    controller.decide(&message, transient())
                {
                    prop_assert!(delay >= last);
                    prop_assert!(delay <= Duration::from_secs(cap_secs));
                    last = delay;
                    retries += 1;
                    message = next;
                }
                prop_assert_eq!(retries, max);
            }
        }
    }
}
