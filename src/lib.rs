//! # reportpipe — asynchronous client-report pipeline
//!
//! A durable Redis job queue feeds a single-job-at-a-time worker that pulls
//! candidate clients from an external registry, enriches each one, persists
//! partial rows, renders a CSV, and pushes progress/completion events to the
//! requesting user. A secondary cron-driven queue sweeps expired report
//! files.
//!
//! The peripheral web tier is an external collaborator: it calls
//! [`enqueue_report`] / [`cancel_report`], reads report rows from the store,
//! and subscribes to the push channel.

pub mod cleanup;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod params;
pub mod queue;
pub mod renderer;
pub mod store;
pub mod worker;

use anyhow::Result;
use params::{report_job_id, ReportFilters, ReportJobPayload};
use tracing::info;

/// Queue name the report worker consumes.
pub const REPORT_QUEUE: &str = "report-generation";
/// Queue name for cleanup maintenance jobs.
pub const CLEANUP_QUEUE: &str = "cleanup-jobs";

/// Collaborator verb: create a PENDING report and enqueue its job. Returns
/// the new report id. A second enqueue for the same report dedups inside the
/// queue.
pub async fn enqueue_report(
    db: &db::Database,
    queue: &queue::JobQueue,
    user_id: i64,
    filters: ReportFilters,
) -> Result<i64> {
    let report_id = db.create_report(user_id).await?;
    let payload = ReportJobPayload {
        report_id,
        user_id,
        filters,
    };
    queue
        .enqueue(&report_job_id(report_id), &serde_json::to_string(&payload)?)
        .await?;
    info!(report_id, user_id, "report enqueued");
    Ok(report_id)
}

/// Collaborator verb: cancel a report. Removes the job if it has not started
/// and flips the report to CANCELLED; a running worker notices at its next
/// checkpoint. Returns false if the report was already terminal.
pub async fn cancel_report(
    db: &db::Database,
    queue: &queue::JobQueue,
    notifier: &dyn notify::Notifier,
    report_id: i64,
) -> Result<bool> {
    let removed = queue
        .remove_if_not_started(&report_job_id(report_id))
        .await?;
    let flipped = db.cancel_report(report_id, "Cancelled by user").await?;
    if flipped {
        if let Some(report) = db.get_report(report_id).await? {
            notifier
                .failed(report.user_id, report_id, "Cancelled by user")
                .await;
        }
    }
    info!(report_id, removed_from_queue = removed, "report cancelled");
    Ok(removed || flipped)
}
