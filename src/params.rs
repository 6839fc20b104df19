//! # Job Parameters — filters and the queue payload
//!
//! The filter set travels twice: serialized into the queued job payload and
//! then forwarded verbatim to the client registry search, so the serde shape
//! here doubles as the upstream wire contract (camelCase, absent-when-unset).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A closed-or-open date window; `to` left empty means "until now".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

/// Client selection criteria for one report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilters {
    /// Module identifiers the client must hold a license for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<String>,
    /// Only clients not previously exported.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
    /// Only clients whose first license falls inside the window.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub new: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_start: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_end: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_activation: Option<DateRange>,
}

/// The queued job payload: which report, for whom, filtered how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportJobPayload {
    pub report_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub filters: ReportFilters,
}

/// Deterministic job id for a report, used for dedup and targeted removal.
pub fn report_job_id(report_id: i64) -> String {
    format!("report-{report_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_deterministic() {
        assert_eq!(report_job_id(42), "report-42");
    }

    #[test]
    fn payload_roundtrips_through_json() {
        let payload = ReportJobPayload {
            report_id: 7,
            user_id: 9,
            filters: ReportFilters {
                modules: vec!["sg".to_string()],
                unique: true,
                new: false,
                license_start: Some(DateRange {
                    from: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
                    to: Some(NaiveDate::from_ymd_opt(2023, 6, 30).unwrap()),
                }),
                license_end: None,
                license_activation: None,
            },
        };
        let json = serde_json::to_string(&payload).unwrap();
        let back: ReportJobPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn unset_filters_stay_off_the_wire() {
        let json = serde_json::to_string(&ReportFilters::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn payload_tolerates_a_missing_filter_block() {
        let payload: ReportJobPayload =
            serde_json::from_str(r#"{"reportId": 3, "userId": 8}"#).unwrap();
        assert_eq!(payload.report_id, 3);
        assert_eq!(payload.filters, ReportFilters::default());
    }
}
