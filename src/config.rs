//! # Pipeline Configuration
//!
//! Tuning knobs for retry policy, upstream pacing, and cleanup retention.
//! Defaults mirror the production deployment; the CLI overrides the ones it
//! exposes and leaves the rest alone.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Delivery attempts per job before the report is marked failed.
    pub max_attempts: u32,
    /// Base delay for exponential redelivery backoff (base, 2x, 4x, ...).
    pub backoff_base: Duration,
    /// Consecutive enrichment failures that abort the run as an outage.
    pub consecutive_failure_limit: u32,
    /// Pause between detail calls so the upstream is not hammered.
    pub inter_request_delay: Duration,
    /// Re-read the report row for cancellation every nth candidate.
    pub cancel_check_interval: usize,
    /// Attempts per detail call inside the gateway.
    pub detail_retries: u32,
    /// Per-attempt timeout for a detail call.
    pub detail_timeout: Duration,
    /// Idle sleep between queue polls.
    pub poll_interval: Duration,
    /// Completed reports older than this many days lose their files.
    pub cleanup_retention_days: i64,
    /// Cron expression for the recurring cleanup job.
    pub cleanup_cron: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            max_attempts: 3,
            backoff_base: Duration::from_millis(10_000),
            consecutive_failure_limit: 5,
            inter_request_delay: Duration::from_millis(250),
            cancel_check_interval: 5,
            detail_retries: 2,
            detail_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            cleanup_retention_days: 7,
            cleanup_cron: "0 3 * * *".to_string(),
        }
    }
}
