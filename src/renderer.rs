//! # Report Renderer — result rows to a downloadable CSV
//!
//! Pure transformation: an ordered slice of result rows becomes one CSV file
//! under the reports directory, named `report-<id>-<millis>.csv` so retries
//! never collide, plus the public URL the download layer serves it under.
//!
//! Every field is quoted. Spreadsheet importers mangle unquoted
//! numeric-looking strings — phone numbers and EDRPOU codes with leading
//! zeros — so `QuoteStyle::Always` is not optional here.

use crate::db::ReportItemRow;
use anyhow::{Context, Result};
use csv::{QuoteStyle, WriterBuilder};
use std::path::{Path, PathBuf};

const HEADERS: [&str; 8] = [
    "EDRPOU",
    "Account Name",
    "Email",
    "Phone",
    "SG Count",
    "License Start Date",
    "Partner",
    "Gold Partner",
];

/// A rendered report file: filesystem path plus the public download URL.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub path: PathBuf,
    pub download_url: String,
}

pub struct CsvRenderer {
    reports_dir: PathBuf,
    site_url: String,
}

impl CsvRenderer {
    pub fn new(reports_dir: impl Into<PathBuf>, site_url: &str) -> Self {
        CsvRenderer {
            reports_dir: reports_dir.into(),
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }

    /// Write the rows for one report. Zero rows yields `Ok(None)` — the
    /// caller decides whether an empty report is fatal.
    pub fn render(&self, report_id: i64, items: &[ReportItemRow]) -> Result<Option<RenderedReport>> {
        if items.is_empty() {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.reports_dir)
            .with_context(|| format!("cannot create {}", self.reports_dir.display()))?;

        let filename = format!(
            "report-{}-{}.csv",
            report_id,
            chrono::Utc::now().timestamp_millis()
        );
        let path = self.reports_dir.join(&filename);

        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_path(&path)
            .with_context(|| format!("cannot create {}", path.display()))?;

        writer.write_record(HEADERS)?;
        for item in items {
            writer.write_record([
                item.edrpou.as_str(),
                item.account_name.as_deref().unwrap_or(""),
                item.email.as_deref().unwrap_or(""),
                item.phone.as_deref().unwrap_or(""),
                &item
                    .sg_count
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
                &item
                    .license_start_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                item.partner.as_deref().unwrap_or(""),
                item.gold_partner.as_deref().unwrap_or(""),
            ])?;
        }
        writer
            .flush()
            .with_context(|| format!("cannot flush {}", path.display()))?;

        Ok(Some(RenderedReport {
            download_url: format!("{}/reports/{}", self.site_url, filename),
            path,
        }))
    }

    /// Resolve a download URL back to the file path it was rendered to.
    /// Returns `None` for URLs outside the reports namespace.
    pub fn path_for_url(&self, download_url: &str) -> Option<PathBuf> {
        let filename = download_url.rsplit('/').next()?;
        if filename.is_empty() || filename.contains("..") {
            return None;
        }
        Some(self.reports_dir.join(filename))
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn item(report_id: i64, edrpou: &str, phone: Option<&str>) -> ReportItemRow {
        ReportItemRow {
            report_id,
            edrpou: edrpou.to_string(),
            account_name: Some(format!("Account {edrpou}")),
            email: Some(format!("{edrpou}@example.com")),
            phone: phone.map(String::from),
            sg_count: Some(10),
            license_start_date: NaiveDate::from_ymd_opt(2023, 1, 15),
            partner: Some("Partner A".to_string()),
            gold_partner: Some("Yes".to_string()),
        }
    }

    #[test]
    fn zero_rows_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CsvRenderer::new(dir.path(), "http://localhost:3000");
        assert!(renderer.render(1, &[]).unwrap().is_none());
        // And no stray file appeared
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn rows_roundtrip_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CsvRenderer::new(dir.path(), "http://localhost:3000");
        let items = vec![
            item(7, "12345678", Some("+380441234567")),
            item(7, "00112233", None),
            item(7, "87654321", Some("+380509876543")),
        ];
        let rendered = renderer.render(7, &items).unwrap().unwrap();
        assert!(rendered.download_url.starts_with("http://localhost:3000/reports/report-7-"));

        let mut reader = csv::Reader::from_path(&rendered.path).unwrap();
        let rows: Vec<csv::StringRecord> =
            reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][0], "12345678");
        assert_eq!(&rows[0][3], "+380441234567");
        assert_eq!(&rows[0][5], "2023-01-15");
        // Leading zeros survive, empty phone stays empty
        assert_eq!(&rows[1][0], "00112233");
        assert_eq!(&rows[1][3], "");
        assert_eq!(&rows[2][0], "87654321");
    }

    #[test]
    fn every_field_is_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CsvRenderer::new(dir.path(), "http://localhost:3000");
        let rendered = renderer
            .render(3, &[item(3, "12345678", Some("+380441234567"))])
            .unwrap()
            .unwrap();
        let raw = std::fs::read_to_string(&rendered.path).unwrap();
        assert!(raw.contains("\"+380441234567\""));
        assert!(raw.contains("\"12345678\""));
    }

    #[test]
    fn url_resolves_back_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CsvRenderer::new(dir.path(), "http://localhost:3000");
        let rendered = renderer
            .render(9, &[item(9, "11223344", None)])
            .unwrap()
            .unwrap();
        assert_eq!(
            renderer.path_for_url(&rendered.download_url).unwrap(),
            rendered.path
        );
        assert!(renderer.path_for_url("http://x/reports/").is_none());
    }
}
