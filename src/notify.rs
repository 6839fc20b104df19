//! # Notification Channel — push events to the report owner
//!
//! The socket relay fans events out to the `user-<id>` room; this client just
//! POSTs JSON to its `/job-progress`, `/job-complete`, `/job-failed`
//! endpoints. Delivery is best-effort: a dropped notification is logged and
//! never fails the job.
//!
//! Progress is clamped monotonically per report before sending, so a retried
//! attempt re-emitting 5/10 after a previous attempt reached 60 stays
//! invisible to subscribers.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::warn;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn progress(&self, user_id: i64, report_id: i64, progress: u8);
    async fn complete(&self, user_id: i64, report_id: i64, download_url: &str);
    async fn failed(&self, user_id: i64, report_id: i64, error: &str);
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressPayload {
    user_id: i64,
    report_id: i64,
    progress: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletePayload {
    user_id: i64,
    report_id: i64,
    data: CompleteData,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteData {
    download_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailedPayload {
    user_id: i64,
    report_id: i64,
    error: String,
}

/// Production notifier POSTing to the socket relay.
pub struct SocketNotifier {
    client: reqwest::Client,
    base_url: String,
    last_progress: Mutex<HashMap<i64, u8>>,
}

impl SocketNotifier {
    pub fn new(socket_server_url: &str) -> Self {
        SocketNotifier {
            client: reqwest::Client::new(),
            base_url: socket_server_url.trim_end_matches('/').to_string(),
            last_progress: Mutex::new(HashMap::new()),
        }
    }

    async fn post<T: Serialize>(&self, path: &str, payload: &T) {
        let url = format!("{}{}", self.base_url, path);
        if let Err(err) = self.client.post(&url).json(payload).send().await {
            warn!(path, error = %err, "notification delivery failed");
        }
    }
}

#[async_trait]
impl Notifier for SocketNotifier {
    async fn progress(&self, user_id: i64, report_id: i64, progress: u8) {
        {
            let mut last = self.last_progress.lock().await;
            let entry = last.entry(report_id).or_insert(0);
            if progress < *entry {
                return;
            }
            *entry = progress;
        }
        self.post(
            "/job-progress",
            &ProgressPayload {
                user_id,
                report_id,
                progress,
            },
        )
        .await;
    }

    async fn complete(&self, user_id: i64, report_id: i64, download_url: &str) {
        self.last_progress.lock().await.remove(&report_id);
        self.post(
            "/job-complete",
            &CompletePayload {
                user_id,
                report_id,
                data: CompleteData {
                    download_url: download_url.to_string(),
                },
            },
        )
        .await;
    }

    async fn failed(&self, user_id: i64, report_id: i64, error: &str) {
        self.last_progress.lock().await.remove(&report_id);
        self.post(
            "/job-failed",
            &FailedPayload {
                user_id,
                report_id,
                error: error.to_string(),
            },
        )
        .await;
    }
}
