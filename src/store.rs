//! # ReportStore — the pipeline's view of durable state
//!
//! The worker and the cleanup job talk to the store through this trait
//! instead of holding `Database` directly, so tests drive the pipeline with
//! an in-memory fake and the production binary passes the PostgreSQL-backed
//! [`Database`](crate::db::Database). Cancellation relies on re-reading
//! authoritative status through this seam at every checkpoint.

use crate::db::{Database, ReportItemRow, ReportRow, ReportStatus};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Current status, `None` if the report does not exist.
    async fn report_status(&self, report_id: i64) -> Result<Option<ReportStatus>>;

    /// PENDING/PROCESSING → PROCESSING. False means the report is terminal
    /// (usually cancelled) and the run must not proceed.
    async fn mark_processing(&self, report_id: i64) -> Result<bool>;

    /// PROCESSING → COMPLETED with the download reference. False means a
    /// cancel won the race during rendering.
    async fn complete_report(&self, report_id: i64, download_url: &str) -> Result<bool>;

    /// Non-terminal → FAILED with a user-facing message.
    async fn fail_report(&self, report_id: i64, error: &str) -> Result<()>;

    async fn insert_report_item(&self, item: &ReportItemRow) -> Result<()>;

    /// Bulk-delete all items for a report; returns rows removed.
    async fn purge_report_items(&self, report_id: i64) -> Result<u64>;

    /// Items in candidate-enumeration order.
    async fn report_items(&self, report_id: i64) -> Result<Vec<ReportItemRow>>;

    /// COMPLETED reports whose file is older than the cutoff and not yet
    /// cleaned up.
    async fn expired_reports(&self, cutoff: DateTime<Utc>) -> Result<Vec<ReportRow>>;

    /// Stamp `deleted_at` after the file is gone.
    async fn mark_report_deleted(&self, report_id: i64) -> Result<()>;
}

#[async_trait]
impl ReportStore for Database {
    async fn report_status(&self, report_id: i64) -> Result<Option<ReportStatus>> {
        Database::report_status(self, report_id).await
    }

    async fn mark_processing(&self, report_id: i64) -> Result<bool> {
        Database::mark_processing(self, report_id).await
    }

    async fn complete_report(&self, report_id: i64, download_url: &str) -> Result<bool> {
        Database::complete_report(self, report_id, download_url).await
    }

    async fn fail_report(&self, report_id: i64, error: &str) -> Result<()> {
        Database::fail_report(self, report_id, error).await
    }

    async fn insert_report_item(&self, item: &ReportItemRow) -> Result<()> {
        Database::insert_report_item(self, item).await
    }

    async fn purge_report_items(&self, report_id: i64) -> Result<u64> {
        Database::purge_report_items(self, report_id).await
    }

    async fn report_items(&self, report_id: i64) -> Result<Vec<ReportItemRow>> {
        Database::report_items(self, report_id).await
    }

    async fn expired_reports(&self, cutoff: DateTime<Utc>) -> Result<Vec<ReportRow>> {
        Database::expired_reports(self, cutoff).await
    }

    async fn mark_report_deleted(&self, report_id: i64) -> Result<()> {
        Database::mark_report_deleted(self, report_id).await
    }
}
