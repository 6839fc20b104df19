//! Report lifecycle operations.
//!
//! Every status-moving write is conditional on the current status so the
//! PENDING→PROCESSING→terminal invariant holds under concurrent cancellation:
//! the worker can never resurrect a CANCELLED report, and the cleanup job can
//! never touch anything but `deleted_at`.

use super::{Database, ReportRow, ReportStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};

impl Database {
    /// Create a new PENDING report for a user, returning its id.
    pub async fn create_report(&self, user_id: i64) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO reports (user_id, status) VALUES ($1, 'PENDING') RETURNING id",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Get a single report by id.
    pub async fn get_report(&self, report_id: i64) -> Result<Option<ReportRow>> {
        let row = sqlx::query_as::<_, ReportRow>(
            "SELECT id, user_id, status, error, download_url,
                    created_at, completed_at, deleted_at
             FROM reports WHERE id = $1",
        )
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Read just the current status. The worker polls this at its
    /// cancellation checkpoints.
    pub async fn report_status(&self, report_id: i64) -> Result<Option<ReportStatus>> {
        let status: Option<ReportStatus> =
            sqlx::query_scalar("SELECT status FROM reports WHERE id = $1")
                .bind(report_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(status)
    }

    /// Move a report into PROCESSING. A no-op on retry (already PROCESSING)
    /// and refused once the report is terminal. Returns false if the report
    /// was not movable, which the caller treats as a cancellation check.
    pub async fn mark_processing(&self, report_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reports SET status = 'PROCESSING'
             WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')",
        )
        .bind(report_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Finalize a report as COMPLETED with its download reference.
    ///
    /// Conditional on PROCESSING: if a cancel landed during rendering the
    /// update affects zero rows and the caller unwinds as cancelled instead.
    pub async fn complete_report(&self, report_id: i64, download_url: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reports
             SET status = 'COMPLETED', download_url = $1, completed_at = NOW(), error = NULL
             WHERE id = $2 AND status = 'PROCESSING'",
        )
        .bind(download_url)
        .bind(report_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Finalize a report as FAILED with a user-facing message. Terminal
    /// states are left untouched.
    pub async fn fail_report(&self, report_id: i64, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE reports SET status = 'FAILED', error = $1, completed_at = NOW()
             WHERE id = $2 AND status IN ('PENDING', 'PROCESSING')",
        )
        .bind(error)
        .bind(report_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flip a not-yet-terminal report to CANCELLED (the external cancel path).
    /// Returns false if the report was already terminal.
    pub async fn cancel_report(&self, report_id: i64, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reports SET status = 'CANCELLED', error = $1, completed_at = NOW()
             WHERE id = $2 AND status IN ('PENDING', 'PROCESSING')",
        )
        .bind(reason)
        .bind(report_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// COMPLETED reports with a download file older than the cutoff that have
    /// not been cleaned up yet.
    pub async fn expired_reports(&self, cutoff: DateTime<Utc>) -> Result<Vec<ReportRow>> {
        let rows = sqlx::query_as::<_, ReportRow>(
            "SELECT id, user_id, status, error, download_url,
                    created_at, completed_at, deleted_at
             FROM reports
             WHERE status = 'COMPLETED'
               AND download_url IS NOT NULL
               AND completed_at < $1
               AND deleted_at IS NULL
             ORDER BY completed_at",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Stamp `deleted_at` after the report file has been removed. Never
    /// changes status — COMPLETED stays COMPLETED.
    pub async fn mark_report_deleted(&self, report_id: i64) -> Result<()> {
        sqlx::query("UPDATE reports SET deleted_at = NOW() WHERE id = $1")
            .bind(report_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
