//! Report item operations.
//!
//! Items are transient working storage: purged in bulk before every (re)run
//! so a failed attempt can never leak rows into the next one, written one at
//! a time as enrichment succeeds, and purged again after the output file is
//! rendered.

use super::{Database, ReportItemRow};
use anyhow::Result;

impl Database {
    /// Delete all items for a report. Idempotent: deleting zero rows is fine.
    pub async fn purge_report_items(&self, report_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM report_items WHERE report_id = $1")
            .bind(report_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Insert one enriched row.
    pub async fn insert_report_item(&self, item: &ReportItemRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO report_items
                (report_id, edrpou, account_name, email, phone, sg_count,
                 license_start_date, partner, gold_partner)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(item.report_id)
        .bind(&item.edrpou)
        .bind(&item.account_name)
        .bind(&item.email)
        .bind(&item.phone)
        .bind(item.sg_count)
        .bind(item.license_start_date)
        .bind(&item.partner)
        .bind(&item.gold_partner)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All items for a report in insertion order — the order candidates were
    /// enumerated, which the renderer preserves.
    pub async fn report_items(&self, report_id: i64) -> Result<Vec<ReportItemRow>> {
        let rows = sqlx::query_as::<_, ReportItemRow>(
            "SELECT report_id, edrpou, account_name, email, phone, sg_count,
                    license_start_date, partner, gold_partner
             FROM report_items WHERE report_id = $1 ORDER BY id",
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Count of persisted items for a report.
    pub async fn count_report_items(&self, report_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM report_items WHERE report_id = $1")
                .bind(report_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
