//! # Cleanup — expired report file retention
//!
//! A recurring maintenance job on its own queue namespace: completed reports
//! whose file is older than the retention window get the file deleted and
//! `deleted_at` stamped. The status stays COMPLETED — cleanup does
//! bookkeeping, never lifecycle.
//!
//! The scheduler registers one named cron entry (re-registration replaces,
//! never duplicates) and enqueues a cleanup job each time the pattern fires;
//! the job id carries the fire timestamp so an overlapping tick dedups.

use crate::config::PipelineConfig;
use crate::queue::JobQueue;
use crate::renderer::CsvRenderer;
use crate::store::ReportStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use croner::Cron;
use tracing::{error, info, warn};

/// Name of the recurring schedule entry and prefix of its job ids.
pub const CLEANUP_SCHEDULE: &str = "delete-old-reports";

/// Reports completed before this instant are eligible for cleanup.
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: i64) -> DateTime<Utc> {
    now - Duration::days(retention_days)
}

/// Outcome counts for one cleanup sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupStats {
    pub selected: usize,
    pub deleted: usize,
}

/// One cleanup sweep: select expired reports, delete each file (a file that
/// is already gone counts as deleted), stamp `deleted_at`.
pub async fn run_cleanup<S: ReportStore>(
    store: &S,
    renderer: &CsvRenderer,
    retention_days: i64,
) -> Result<CleanupStats> {
    let cutoff = retention_cutoff(Utc::now(), retention_days);
    let expired = store.expired_reports(cutoff).await?;
    let mut stats = CleanupStats {
        selected: expired.len(),
        ..Default::default()
    };
    if expired.is_empty() {
        info!(retention_days, "no expired reports to clean up");
        return Ok(stats);
    }

    for report in &expired {
        let Some(url) = report.download_url.as_deref() else {
            continue;
        };
        let Some(path) = renderer.path_for_url(url) else {
            warn!(report_id = report.id, url, "download url does not resolve to a report file");
            continue;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(report_id = report.id, path = %path.display(), "report file was already gone");
            }
            Err(err) => {
                error!(report_id = report.id, path = %path.display(), error = %err, "could not delete report file");
                continue;
            }
        }
        store.mark_report_deleted(report.id).await?;
        stats.deleted += 1;
    }

    info!(
        deleted = stats.deleted,
        selected = stats.selected,
        "cleanup sweep finished"
    );
    Ok(stats)
}

/// The cleanup queue consumer. Shares the queue machinery with the report
/// worker but listens on its own namespace.
pub async fn run_cleanup_worker<S: ReportStore>(
    queue: &JobQueue,
    store: &S,
    renderer: &CsvRenderer,
    config: &PipelineConfig,
) -> Result<()> {
    info!(queue = queue.name(), "cleanup worker listening");
    loop {
        match queue.next_job().await {
            Ok(Some(job)) => {
                match run_cleanup(store, renderer, config.cleanup_retention_days).await {
                    Ok(_) => queue.complete(&job).await?,
                    Err(err) if !job.is_final_attempt() => {
                        let delay = queue.retry_later(&job).await?;
                        warn!(
                            job_id = %job.id,
                            retry_in_secs = delay.as_secs(),
                            error = %err,
                            "cleanup failed, will retry"
                        );
                    }
                    Err(err) => {
                        error!(job_id = %job.id, error = %err, "cleanup failed terminally");
                        queue.fail(&job, &err.to_string()).await?;
                    }
                }
            }
            Ok(None) => tokio::time::sleep(config.poll_interval).await,
            Err(err) => {
                error!(error = %err, "cleanup queue fetch failed");
                tokio::time::sleep(config.poll_interval).await;
            }
        }
    }
}

/// Register the recurring schedule and enqueue a cleanup job at every cron
/// fire. Runs until the process stops.
pub async fn run_cleanup_scheduler(queue: &JobQueue, cron_expr: &str) -> Result<()> {
    let cron = Cron::new(cron_expr)
        .parse()
        .with_context(|| format!("invalid cleanup cron expression: {cron_expr}"))?;

    // Idempotent: re-running the scheduler replaces the entry.
    queue.register_repeat(CLEANUP_SCHEDULE, cron_expr).await?;
    info!(cron = cron_expr, schedule = CLEANUP_SCHEDULE, "cleanup schedule registered");

    loop {
        let now = Utc::now();
        let next = cron
            .find_next_occurrence(&now, false)
            .context("cron pattern yields no future occurrence")?;
        let wait = (next - now).to_std().unwrap_or_default();
        info!(fire_at = %next, "next cleanup tick scheduled");
        tokio::time::sleep(wait).await;

        let job_id = format!("{}-{}", CLEANUP_SCHEDULE, next.timestamp());
        match queue.enqueue(&job_id, "{}").await {
            Ok(true) => info!(job_id, "cleanup job enqueued"),
            Ok(false) => warn!(job_id, "cleanup job already queued, skipped"),
            Err(err) => error!(job_id, error = %err, "could not enqueue cleanup job"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_selects_eight_day_old_but_not_six() {
        let now = Utc::now();
        let cutoff = retention_cutoff(now, 7);
        let eight_days_old = now - Duration::days(8);
        let six_days_old = now - Duration::days(6);
        assert!(eight_days_old < cutoff);
        assert!(six_days_old > cutoff);
    }
}
