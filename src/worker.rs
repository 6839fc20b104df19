//! # Report Worker — the job pipeline state machine
//!
//! One job at a time: validate → purge stale rows → fetch candidates →
//! enrich each candidate → render the CSV → finalize. Progress milestones are
//! pushed to the owner throughout (5/10/15…90/95), and the report row is
//! re-read for cancellation at fixed checkpoints — before the first
//! enrichment call, every 5th iteration after, and once more before
//! finalizing — so a cancel flips persisted state and the worker unwinds
//! cleanly at its next checkpoint.
//!
//! ## Failure handling at the queue boundary
//!
//! [`settle_job_error`] maps a failed run onto a [`JobDisposition`]:
//! cancellation discards the job outright (the report is already CANCELLED),
//! fatal errors mark the report FAILED immediately, retryable errors lean on
//! the queue's exponential backoff until the attempt budget is spent. The
//! report row is only touched through conditional writes, so no path here can
//! resurrect a terminal report.

use crate::config::PipelineConfig;
use crate::db::{ReportItemRow, ReportStatus};
use crate::error::JobError;
use crate::gateway::{CandidateRecord, CandidateSource, EnrichmentRecord};
use crate::notify::Notifier;
use crate::params::ReportJobPayload;
use crate::queue::{JobQueue, QueueJob};
use crate::renderer::{CsvRenderer, RenderedReport};
use crate::store::ReportStore;
use anyhow::Result;
use tracing::{error, info, warn};

/// Progress value for the enrichment phase: 15 at the start, approaching 90
/// as the last candidate lands. Rendering bumps to 95, completion to done.
pub fn enrich_progress(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 15;
    }
    15 + ((processed as f64 / total as f64) * 75.0).round() as u8
}

/// Merge list-stage fields with detail-stage fields into one result row.
/// A missing enrichment record leaves the contact fields empty — the
/// candidate still appears in the report.
pub fn build_item(
    report_id: i64,
    candidate: &CandidateRecord,
    detail: Option<EnrichmentRecord>,
) -> ReportItemRow {
    let detail = detail.unwrap_or(EnrichmentRecord {
        account_name: None,
        email: None,
        phone: None,
        sg_count: None,
    });
    ReportItemRow {
        report_id,
        edrpou: candidate.edrpou.clone(),
        account_name: detail.account_name,
        email: detail.email,
        phone: detail.phone,
        sg_count: detail.sg_count,
        license_start_date: candidate.license_start_date,
        partner: candidate.partner.clone(),
        gold_partner: candidate.gold_partner.clone(),
    }
}

/// Cancellation checkpoint: re-read authoritative status and raise the
/// sentinel if the owner cancelled.
async fn ensure_not_cancelled<S: ReportStore>(store: &S, report_id: i64) -> Result<(), JobError> {
    match store.report_status(report_id).await? {
        Some(ReportStatus::Cancelled) => Err(JobError::Cancelled),
        _ => Ok(()),
    }
}

/// Drive one report job through the full pipeline.
pub async fn run_report_job<S, G, N>(
    store: &S,
    gateway: &G,
    notifier: &N,
    renderer: &CsvRenderer,
    config: &PipelineConfig,
    payload: &ReportJobPayload,
) -> Result<RenderedReport, JobError>
where
    S: ReportStore,
    G: CandidateSource,
    N: Notifier,
{
    let report_id = payload.report_id;
    let user_id = payload.user_id;

    // ── VALIDATING ──────────────────────────────────────────────
    if report_id <= 0 || user_id <= 0 {
        return Err(JobError::fatal("report request is missing its identifiers"));
    }
    match store.report_status(report_id).await? {
        None => {
            return Err(JobError::Fatal(format!("report {report_id} does not exist")));
        }
        Some(ReportStatus::Cancelled) => return Err(JobError::Cancelled),
        Some(_) => {}
    }

    // ── PURGING ─────────────────────────────────────────────────
    if !store.mark_processing(report_id).await? {
        // The report went terminal between validation and here.
        return Err(JobError::Cancelled);
    }
    notifier.progress(user_id, report_id, 5).await;
    let purged = store.purge_report_items(report_id).await?;
    if purged > 0 {
        info!(report_id, purged, "cleared rows from a previous attempt");
    }
    notifier.progress(user_id, report_id, 10).await;

    // ── FETCHING_CANDIDATES ─────────────────────────────────────
    let candidates = gateway
        .list_candidates(&payload.filters)
        .await
        .map_err(|err| JobError::Retryable(format!("client registry unavailable: {err}")))?;
    if candidates.is_empty() {
        return Err(JobError::fatal(
            "no matching clients found for the selected filters",
        ));
    }
    let total = candidates.len();
    info!(report_id, candidates = total, "candidate list fetched");
    notifier.progress(user_id, report_id, 15).await;

    // ── ENRICHING ───────────────────────────────────────────────
    let mut consecutive_failures: u32 = 0;
    for (index, candidate) in candidates.iter().enumerate() {
        if index % config.cancel_check_interval == 0 {
            ensure_not_cancelled(store, report_id).await?;
        }
        match gateway.get_detail(&candidate.edrpou).await {
            Ok(detail) => {
                consecutive_failures = 0;
                let item = build_item(report_id, candidate, detail);
                store.insert_report_item(&item).await?;
            }
            Err(err) => {
                consecutive_failures += 1;
                warn!(
                    report_id,
                    edrpou = %candidate.edrpou,
                    consecutive_failures,
                    error = %err,
                    "enrichment failed, skipping row"
                );
                if consecutive_failures >= config.consecutive_failure_limit {
                    return Err(JobError::retryable(
                        "upstream client service is unavailable",
                    ));
                }
            }
        }
        notifier
            .progress(user_id, report_id, enrich_progress(index + 1, total))
            .await;
        tokio::time::sleep(config.inter_request_delay).await;
    }

    // ── RENDERING ───────────────────────────────────────────────
    let items = store.report_items(report_id).await?;
    let rendered = renderer
        .render(report_id, &items)
        .map_err(|_| JobError::Fatal(format!("could not write the report file for report {report_id}")))?
        .ok_or_else(|| {
            JobError::Fatal(format!("report {report_id} produced no rows to export"))
        })?;
    notifier.progress(user_id, report_id, 95).await;

    // ── FINALIZING ──────────────────────────────────────────────
    // A cancel could have arrived while the file was being written.
    ensure_not_cancelled(store, report_id).await?;
    if !store.complete_report(report_id, &rendered.download_url).await? {
        return Err(JobError::Cancelled);
    }
    notifier
        .complete(user_id, report_id, &rendered.download_url)
        .await;
    // The rendered file is the durable artifact; the rows were scaffolding.
    store.purge_report_items(report_id).await?;
    info!(report_id, url = %rendered.download_url, "report completed");
    Ok(rendered)
}

/// What the queue should do with a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    /// Delete the job record entirely (cancellation — success of intent).
    Discard,
    /// Redeliver later with backoff.
    Retry,
    /// Park on the failed list; the report has been marked FAILED.
    Fail,
}

/// Apply the failure policy for one failed run: update the report row, notify
/// the owner, and tell the caller how to settle the queue record.
pub async fn settle_job_error<S, N>(
    store: &S,
    notifier: &N,
    payload: &ReportJobPayload,
    err: &JobError,
    final_attempt: bool,
) -> Result<JobDisposition>
where
    S: ReportStore,
    N: Notifier,
{
    let report_id = payload.report_id;
    let user_id = payload.user_id;
    match err {
        JobError::Cancelled => {
            // Report status is already CANCELLED via the external cancel
            // path; just sweep up residual rows.
            store.purge_report_items(report_id).await?;
            info!(report_id, "job cancelled, residual rows purged");
            Ok(JobDisposition::Discard)
        }
        JobError::Fatal(msg) => {
            store.fail_report(report_id, msg).await?;
            notifier.failed(user_id, report_id, msg).await;
            Ok(JobDisposition::Fail)
        }
        JobError::Retryable(msg) => {
            if final_attempt {
                store.fail_report(report_id, msg).await?;
                notifier.failed(user_id, report_id, msg).await;
                Ok(JobDisposition::Fail)
            } else {
                // Leave the report PROCESSING; the redelivered job re-purges.
                Ok(JobDisposition::Retry)
            }
        }
    }
}

/// Run one dequeued job end to end and settle its queue record.
pub async fn process_job<S, G, N>(
    queue: &JobQueue,
    store: &S,
    gateway: &G,
    notifier: &N,
    renderer: &CsvRenderer,
    config: &PipelineConfig,
    job: &QueueJob,
) -> Result<()>
where
    S: ReportStore,
    G: CandidateSource,
    N: Notifier,
{
    let payload: ReportJobPayload = match serde_json::from_str(&job.payload) {
        Ok(payload) => payload,
        Err(err) => {
            // Cannot even address a report row; park the job for inspection.
            error!(job_id = %job.id, error = %err, "job payload is malformed");
            queue.fail(job, "report job payload is malformed").await?;
            return Ok(());
        }
    };

    info!(
        job_id = %job.id,
        report_id = payload.report_id,
        attempt = job.attempt,
        "job started"
    );

    match run_report_job(store, gateway, notifier, renderer, config, &payload).await {
        Ok(_) => queue.complete(job).await,
        Err(err) => {
            match settle_job_error(store, notifier, &payload, &err, job.is_final_attempt()).await? {
                JobDisposition::Discard => queue.discard(job).await,
                JobDisposition::Fail => {
                    error!(job_id = %job.id, report_id = payload.report_id, error = %err, "job failed terminally");
                    queue.fail(job, &err.to_string()).await
                }
                JobDisposition::Retry => {
                    let delay = queue.retry_later(job).await?;
                    warn!(
                        job_id = %job.id,
                        report_id = payload.report_id,
                        attempt = job.attempt,
                        retry_in_secs = delay.as_secs(),
                        error = %err,
                        "job failed, will retry"
                    );
                    Ok(())
                }
            }
        }
    }
}

/// The long-running consumer: pull one job at a time, forever. Concurrency
/// across reports comes only from running more worker processes against the
/// same queue.
pub async fn run_worker<S, G, N>(
    queue: &JobQueue,
    store: &S,
    gateway: &G,
    notifier: &N,
    renderer: &CsvRenderer,
    config: &PipelineConfig,
) -> Result<()>
where
    S: ReportStore,
    G: CandidateSource,
    N: Notifier,
{
    info!(queue = queue.name(), "report worker listening");
    loop {
        match queue.next_job().await {
            Ok(Some(job)) => {
                if let Err(err) =
                    process_job(queue, store, gateway, notifier, renderer, config, &job).await
                {
                    error!(job_id = %job.id, error = %err, "job settlement failed");
                }
            }
            Ok(None) => tokio::time::sleep(config.poll_interval).await,
            Err(err) => {
                error!(error = %err, "queue fetch failed");
                tokio::time::sleep(config.poll_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn progress_is_monotonic_and_bounded() {
        let total = 37;
        let mut last = 15;
        for processed in 1..=total {
            let p = enrich_progress(processed, total);
            assert!(p >= last, "progress regressed at {processed}");
            assert!(p <= 90);
            last = p;
        }
        assert_eq!(enrich_progress(total, total), 90);
    }

    #[test]
    fn progress_handles_single_candidate() {
        assert_eq!(enrich_progress(1, 1), 90);
        assert_eq!(enrich_progress(0, 0), 15);
    }

    #[test]
    fn item_merges_both_stages() {
        let candidate = CandidateRecord {
            edrpou: "12345678".into(),
            license_start_date: NaiveDate::from_ymd_opt(2023, 1, 15),
            partner: Some("Partner A".into()),
            gold_partner: Some("Yes".into()),
        };
        let detail = EnrichmentRecord {
            account_name: Some("Romashka LLC".into()),
            email: Some("info@romashka.ua".into()),
            phone: Some("+380441234567".into()),
            sg_count: Some(10),
        };
        let item = build_item(4, &candidate, Some(detail));
        assert_eq!(item.report_id, 4);
        assert_eq!(item.edrpou, "12345678");
        assert_eq!(item.account_name.as_deref(), Some("Romashka LLC"));
        assert_eq!(item.partner.as_deref(), Some("Partner A"));

        // No detail: candidate still yields a row, contacts stay empty
        let bare = build_item(4, &candidate, None);
        assert_eq!(bare.edrpou, "12345678");
        assert!(bare.account_name.is_none());
        assert_eq!(bare.license_start_date, candidate.license_start_date);
    }
}
