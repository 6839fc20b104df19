//! # Job Errors — the pipeline failure taxonomy
//!
//! Every failure mode inside a report run collapses into one of three
//! shapes, because the queue only has three moves: drop the job, redeliver
//! it later, or park it. Cancellation is a sentinel rather than an error
//! message — the report row already says why the run stopped.

use thiserror::Error;

/// How a report job run ended when it did not complete.
#[derive(Debug, Error)]
pub enum JobError {
    /// The owner cancelled the report; unwind without marking it failed.
    #[error("report was cancelled")]
    Cancelled,

    /// Retrying cannot help (bad input, empty result, unwritable file).
    /// The report goes FAILED immediately, whatever the attempt count.
    #[error("{0}")]
    Fatal(String),

    /// A later attempt may succeed (upstream outage, transient store
    /// error). The queue's backoff policy decides what happens next.
    #[error("{0}")]
    Retryable(String),
}

impl JobError {
    pub fn fatal(msg: impl Into<String>) -> Self {
        JobError::Fatal(msg.into())
    }

    pub fn retryable(msg: impl Into<String>) -> Self {
        JobError::Retryable(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Retryable(_))
    }
}

// Store and plumbing errors default to retryable: a flaky database or Redis
// hop should never permanently fail a report on its first attempt.
impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        JobError::Retryable(format!("{err:#}"))
    }
}

impl From<sqlx::Error> for JobError {
    fn from(err: sqlx::Error) -> Self {
        JobError::Retryable(format!("report store error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_pass_through_display() {
        let err = JobError::fatal("no matching clients found for the selected filters");
        assert_eq!(
            err.to_string(),
            "no matching clients found for the selected filters"
        );
        let err = JobError::retryable("upstream client service is unavailable");
        assert_eq!(err.to_string(), "upstream client service is unavailable");
    }

    #[test]
    fn only_retryable_is_retryable() {
        assert!(JobError::retryable("x").is_retryable());
        assert!(!JobError::fatal("x").is_retryable());
        assert!(!JobError::Cancelled.is_retryable());
    }

    #[test]
    fn anyhow_errors_become_retryable() {
        let err: JobError = anyhow::anyhow!("connection reset").into();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("connection reset"));
    }
}
