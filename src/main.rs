//! # Main — CLI Entry Point
//!
//! Routes subcommands to the pipeline services. The deployment runs three
//! long-lived processes off this binary — `worker`, `cleanup-worker`, and
//! `schedule-cleanup` — while `enqueue` and `cancel` are one-shot
//! collaborator verbs for driving the pipeline without a web tier.
//!
//! ## Global Options
//!
//! Everything is settable by flag or environment: `DATABASE_URL`,
//! `REDIS_URL`, `EXTERNAL_API_URL`, `SOCKET_SERVER_URL`, `SITE_URL`,
//! `REPORTS_DIR`, plus the retry/cleanup knobs.

mod cli;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reportpipe", about = "Asynchronous client-report pipeline")]
struct Cli {
    /// PostgreSQL connection URL for the report store
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Redis connection URL for the job queues
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Base URL of the external client registry
    #[arg(long, env = "EXTERNAL_API_URL", default_value = "http://127.0.0.1:8081")]
    external_api_url: String,

    /// Base URL of the socket relay that pushes events to users
    #[arg(long, env = "SOCKET_SERVER_URL", default_value = "http://127.0.0.1:3001")]
    socket_server_url: String,

    /// Public site URL used to build download links
    #[arg(long, env = "SITE_URL", default_value = "http://localhost:3000")]
    site_url: String,

    /// Directory rendered report files are written to
    #[arg(long, env = "REPORTS_DIR", default_value = "public/reports")]
    reports_dir: PathBuf,

    /// Delivery attempts per job before the report is marked failed
    #[arg(long, env = "JOB_ATTEMPTS", default_value_t = 3)]
    job_attempts: u32,

    /// Base delay in milliseconds for exponential redelivery backoff
    #[arg(long, env = "JOB_BACKOFF_MS", default_value_t = 10_000)]
    backoff_ms: u64,

    /// Completed reports older than this many days lose their files
    #[arg(long, env = "REPORT_CLEANUP_DAYS", default_value_t = 7)]
    cleanup_days: i64,

    /// Cron expression for the recurring cleanup job
    #[arg(long, env = "REPORT_CLEANUP_CRON", default_value = "0 3 * * *")]
    cleanup_cron: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the report worker (one job at a time)
    Worker,
    /// Run the cleanup worker for expired report files
    CleanupWorker,
    /// Register the recurring cleanup schedule and keep it ticking
    ScheduleCleanup,
    /// Create a report and enqueue its generation job
    Enqueue {
        /// Owner of the report
        #[arg(long)]
        user_id: i64,
        /// Module identifier filter (repeatable)
        #[arg(long)]
        module: Vec<String>,
        /// Only clients not previously exported
        #[arg(long)]
        unique: bool,
        /// Only clients whose first license falls inside the window
        #[arg(long)]
        new: bool,
        #[arg(long)]
        license_start_from: Option<NaiveDate>,
        #[arg(long)]
        license_start_to: Option<NaiveDate>,
        #[arg(long)]
        license_end_from: Option<NaiveDate>,
        #[arg(long)]
        license_end_to: Option<NaiveDate>,
        #[arg(long)]
        license_activation_from: Option<NaiveDate>,
        #[arg(long)]
        license_activation_to: Option<NaiveDate>,
    },
    /// Cancel a report (queue removal and/or status flip)
    Cancel {
        #[arg(long)]
        report_id: i64,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Structured logging: LOG_FORMAT=json for container platforms,
    // human-readable stderr otherwise
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_target(false).init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new()?;

    match &cli.command {
        Commands::Worker => rt.block_on(cli::run_worker_cmd(&cli)),
        Commands::CleanupWorker => rt.block_on(cli::run_cleanup_worker_cmd(&cli)),
        Commands::ScheduleCleanup => rt.block_on(cli::run_schedule_cleanup_cmd(&cli)),
        Commands::Enqueue { .. } => rt.block_on(cli::run_enqueue_cmd(&cli)),
        Commands::Cancel { report_id } => rt.block_on(cli::run_cancel_cmd(&cli, *report_id)),
    }
}
