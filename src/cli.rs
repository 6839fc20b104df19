//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Contains the
//! execution logic for each subcommand: the report worker, the cleanup
//! worker/scheduler pair, and the collaborator verbs (enqueue, cancel).

use anyhow::Result;
use reportpipe::config::PipelineConfig;
use reportpipe::db::Database;
use reportpipe::gateway::ExternalApi;
use reportpipe::notify::SocketNotifier;
use reportpipe::params::{DateRange, ReportFilters};
use reportpipe::queue::JobQueue;
use reportpipe::renderer::CsvRenderer;
use reportpipe::{cancel_report, cleanup, enqueue_report, worker, CLEANUP_QUEUE, REPORT_QUEUE};
use std::time::Duration;
use tracing::info;

use super::{Cli, Commands};

fn pipeline_config(cli: &Cli) -> PipelineConfig {
    PipelineConfig {
        max_attempts: cli.job_attempts,
        backoff_base: Duration::from_millis(cli.backoff_ms),
        cleanup_retention_days: cli.cleanup_days,
        cleanup_cron: cli.cleanup_cron.clone(),
        ..PipelineConfig::default()
    }
}

async fn connect_db(cli: &Cli) -> Result<Database> {
    let database_url = cli.database_url.as_deref().ok_or_else(|| {
        anyhow::anyhow!("DATABASE_URL is required (set via --database-url or env)")
    })?;
    let db = Database::connect(database_url).await?;
    db.ensure_schema().await?;
    Ok(db)
}

/// Run the report worker until interrupted.
pub async fn run_worker_cmd(cli: &Cli) -> Result<()> {
    let config = pipeline_config(cli);
    let db = connect_db(cli).await?;
    let queue = JobQueue::connect(
        &cli.redis_url,
        REPORT_QUEUE,
        config.max_attempts,
        config.backoff_base,
    )
    .await?;
    let gateway = ExternalApi::new(&cli.external_api_url, &config);
    let notifier = SocketNotifier::new(&cli.socket_server_url);
    let renderer = CsvRenderer::new(&cli.reports_dir, &cli.site_url);

    tokio::select! {
        result = worker::run_worker(&queue, &db, &gateway, &notifier, &renderer, &config) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("report worker shutting down");
            Ok(())
        }
    }
}

/// Run the cleanup worker until interrupted.
pub async fn run_cleanup_worker_cmd(cli: &Cli) -> Result<()> {
    let config = pipeline_config(cli);
    let db = connect_db(cli).await?;
    let queue = JobQueue::connect(
        &cli.redis_url,
        CLEANUP_QUEUE,
        config.max_attempts,
        config.backoff_base,
    )
    .await?;
    let renderer = CsvRenderer::new(&cli.reports_dir, &cli.site_url);

    tokio::select! {
        result = cleanup::run_cleanup_worker(&queue, &db, &renderer, &config) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("cleanup worker shutting down");
            Ok(())
        }
    }
}

/// Register the recurring cleanup schedule and tick it until interrupted.
pub async fn run_schedule_cleanup_cmd(cli: &Cli) -> Result<()> {
    let config = pipeline_config(cli);
    let queue = JobQueue::connect(
        &cli.redis_url,
        CLEANUP_QUEUE,
        config.max_attempts,
        config.backoff_base,
    )
    .await?;

    tokio::select! {
        result = cleanup::run_cleanup_scheduler(&queue, &config.cleanup_cron) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("cleanup scheduler shutting down");
            Ok(())
        }
    }
}

fn date_range(from: Option<chrono::NaiveDate>, to: Option<chrono::NaiveDate>) -> Option<DateRange> {
    from.map(|from| DateRange { from, to })
}

/// Create a report and enqueue its job.
pub async fn run_enqueue_cmd(cli: &Cli) -> Result<()> {
    let Commands::Enqueue {
        user_id,
        module,
        unique,
        new,
        license_start_from,
        license_start_to,
        license_end_from,
        license_end_to,
        license_activation_from,
        license_activation_to,
    } = &cli.command
    else {
        unreachable!("dispatched for the enqueue subcommand only");
    };

    let config = pipeline_config(cli);
    let db = connect_db(cli).await?;
    let queue = JobQueue::connect(
        &cli.redis_url,
        REPORT_QUEUE,
        config.max_attempts,
        config.backoff_base,
    )
    .await?;

    let filters = ReportFilters {
        modules: module.clone(),
        unique: *unique,
        new: *new,
        license_start: date_range(*license_start_from, *license_start_to),
        license_end: date_range(*license_end_from, *license_end_to),
        license_activation: date_range(*license_activation_from, *license_activation_to),
    };
    let report_id = enqueue_report(&db, &queue, *user_id, filters).await?;
    println!("report {report_id} enqueued");
    Ok(())
}

/// Cancel a report: remove a not-yet-started job and/or flip status.
pub async fn run_cancel_cmd(cli: &Cli, report_id: i64) -> Result<()> {
    let config = pipeline_config(cli);
    let db = connect_db(cli).await?;
    let queue = JobQueue::connect(
        &cli.redis_url,
        REPORT_QUEUE,
        config.max_attempts,
        config.backoff_base,
    )
    .await?;
    let notifier = SocketNotifier::new(&cli.socket_server_url);

    let cancelled = cancel_report(&db, &queue, &notifier, report_id).await?;
    if cancelled {
        println!("report {report_id} cancelled");
    } else {
        println!("report {report_id} was already finished");
    }
    Ok(())
}
