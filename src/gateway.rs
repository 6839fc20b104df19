//! # External Data Source Gateway
//!
//! Wraps the two upstream HTTP services: the client registry search (one POST
//! returning every candidate matching the filters) and the per-client detail
//! lookup that fills in contact fields.
//!
//! Resilience is layered deliberately: the list call gets no retry here — the
//! job-level backoff policy owns that — while the detail call retries a
//! bounded number of times with a per-attempt timeout, because a single slow
//! client must not sink a thousand-row report.

use crate::config::PipelineConfig;
use crate::params::ReportFilters;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// List-stage record: the candidate identifier plus the license/partner
/// fields the search index already knows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub edrpou: String,
    #[serde(default)]
    pub license_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub partner: Option<String>,
    #[serde(default)]
    pub gold_partner: Option<String>,
}

/// Detail-stage record: display and contact fields for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentRecord {
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub sg_count: Option<i64>,
}

#[derive(Deserialize)]
struct ListResponse {
    status: String,
    #[serde(default)]
    clients: Vec<CandidateRecord>,
}

/// The worker's seam onto the upstream services; faked in tests.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// All candidates matching the filters, in upstream order.
    async fn list_candidates(&self, filters: &ReportFilters) -> Result<Vec<CandidateRecord>>;

    /// Enrichment for one candidate. `Ok(None)` means the upstream has no
    /// data for this entity — not an error.
    async fn get_detail(&self, edrpou: &str) -> Result<Option<EnrichmentRecord>>;
}

/// Production gateway over `reqwest`.
pub struct ExternalApi {
    client: reqwest::Client,
    base_url: String,
    detail_retries: u32,
    detail_timeout: Duration,
}

impl ExternalApi {
    pub fn new(base_url: &str, config: &PipelineConfig) -> Self {
        ExternalApi {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            detail_retries: config.detail_retries,
            detail_timeout: config.detail_timeout,
        }
    }
}

#[async_trait]
impl CandidateSource for ExternalApi {
    async fn list_candidates(&self, filters: &ReportFilters) -> Result<Vec<CandidateRecord>> {
        let url = format!("{}/clients/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(filters)
            .send()
            .await
            .context("client registry unreachable")?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "client registry returned HTTP {}",
                response.status().as_u16()
            ));
        }
        let body: ListResponse = response
            .json()
            .await
            .context("client registry returned malformed JSON")?;
        if body.status != "ok" {
            return Err(anyhow!("client registry rejected the search: {}", body.status));
        }
        Ok(body.clients)
    }

    async fn get_detail(&self, edrpou: &str) -> Result<Option<EnrichmentRecord>> {
        let url = format!("{}/clients/{}", self.base_url, edrpou);
        for attempt in 1..=self.detail_retries {
            let result = self
                .client
                .get(&url)
                .timeout(self.detail_timeout)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    let record: EnrichmentRecord = response
                        .json()
                        .await
                        .context("client detail returned malformed JSON")?;
                    return Ok(Some(record));
                }
                Ok(response) if response.status().is_server_error() => {
                    warn!(
                        edrpou,
                        attempt,
                        status = response.status().as_u16(),
                        "client detail server error"
                    );
                }
                // 4xx and friends: the upstream has nothing for this entity.
                Ok(_) => return Ok(None),
                Err(err) => {
                    warn!(edrpou, attempt, error = %err, "client detail request failed");
                }
            }
            if attempt < self.detail_retries {
                tokio::time::sleep(Duration::from_millis(attempt as u64 * 1000)).await;
            }
        }
        Err(anyhow!(
            "client detail for {} failed after {} attempts",
            edrpou,
            self.detail_retries
        ))
    }
}
