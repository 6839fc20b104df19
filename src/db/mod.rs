//! # Database — PostgreSQL Report Store
//!
//! Durable record of each report's lifecycle plus its transient result rows,
//! via `sqlx::PgPool`.
//!
//! ## Schema
//!
//! - `reports`: owner, status, error, download_url, created/completed/deleted
//!   timestamps
//! - `report_items`: one denormalized row per enriched client, working storage
//!   that is purged on every (re)run and again after rendering
//!
//! ## Module Structure
//!
//! Operations are split into submodules by domain:
//!
//! - [`reports`] — report lifecycle (create, conditional status transitions,
//!   cancellation, cleanup selection)
//! - [`items`] — bulk purge / incremental insert / ordered listing of rows
//!
//! ## Status Invariant
//!
//! Transitions are monotonic along PENDING→PROCESSING→terminal. Every write
//! that moves a report forward is conditional on the current status, so a
//! cancellation observed by one actor can never be overwritten by another.

mod items;
mod reports;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

/// Report lifecycle states, stored as TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "PENDING",
            ReportStatus::Processing => "PROCESSING",
            ReportStatus::Completed => "COMPLETED",
            ReportStatus::Failed => "FAILED",
            ReportStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal states admit no further status change (only `deleted_at`).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReportStatus::Completed | ReportStatus::Failed | ReportStatus::Cancelled
        )
    }
}

// ── Row types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReportRow {
    pub id: i64,
    pub user_id: i64,
    pub status: ReportStatus,
    pub error: Option<String>,
    pub download_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One enriched result row. List-stage fields (dates, partners) and
/// detail-stage fields (name, contacts, count) are denormalized together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReportItemRow {
    pub report_id: i64,
    pub edrpou: String,
    pub account_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub sg_count: Option<i64>,
    pub license_start_date: Option<NaiveDate>,
    pub partner: Option<String>,
    pub gold_partner: Option<String>,
}

// ── Database struct and connection ──────────────────────────────

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// Manually parses the URL to preserve the full username — sqlx's built-in
    /// parser strips suffixes that some managed poolers require.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username)
            .statement_cache_capacity(0);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the schema idempotently (CREATE TABLE IF NOT EXISTS).
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../../migrations/0001_reports.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Health check: execute `SELECT 1` to verify database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!ReportStatus::Pending.is_terminal());
        assert!(!ReportStatus::Processing.is_terminal());
        assert!(ReportStatus::Completed.is_terminal());
        assert!(ReportStatus::Failed.is_terminal());
        assert!(ReportStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_text_is_screaming_case() {
        assert_eq!(ReportStatus::Pending.as_str(), "PENDING");
        assert_eq!(ReportStatus::Cancelled.as_str(), "CANCELLED");
    }
}
