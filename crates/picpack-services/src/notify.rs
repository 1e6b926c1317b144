//! Completion/failure notification delivery.
//!
//! Posts the job outcome to an ordered list of equivalent webhook endpoints
//! (primary first, then fallback mirrors); the first 2xx stops the loop.
//! Delivery failure never fails the job itself: the archive is already in
//! object storage and re-running the job would duplicate it.

use picpack_core::models::{JobOutcome, JobStatus};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to create HTTP client for notifications: {0}")]
    ClientBuild(String),

    #[error("No notification endpoints configured")]
    NoEndpoints,
}

/// Success payload posted to the gallery backend's webhook.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionNotice {
    pub event_id: String,
    pub email: String,
    pub download_url: String,
    pub file_count: usize,
    #[serde(rename = "finalSizeMB")]
    pub final_size_mb: f64,
    pub processing_time_seconds: f64,
    pub request_id: String,
    /// Items that could not be bundled, so the rendered email can list them.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_files: Vec<String>,
}

/// Failure payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureNotice {
    pub event_id: String,
    pub email: String,
    pub error: String,
    pub is_error: bool,
    pub request_id: String,
}

#[derive(Debug)]
pub struct NotificationDispatcher {
    client: reqwest::Client,
    endpoints: Vec<String>,
}

impl NotificationDispatcher {
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> Result<Self, NotifyError> {
        if endpoints.is_empty() {
            return Err(NotifyError::NoEndpoints);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("picpack-worker/1.0")
            .build()
            .map_err(|e| NotifyError::ClientBuild(e.to_string()))?;

        Ok(Self { client, endpoints })
    }

    /// Deliver `outcome` to the first endpoint that accepts it. Returns
    /// whether any endpoint returned 2xx.
    #[tracing::instrument(skip(self, outcome), fields(event_id = %outcome.event_id, status = %outcome.status))]
    pub async fn notify(&self, outcome: &JobOutcome) -> bool {
        let body = match self.serialize_payload(outcome) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize notification payload");
                return false;
            }
        };

        for endpoint in &self.endpoints {
            match self.post(endpoint, &body).await {
                Ok(status) => {
                    tracing::info!(
                        endpoint = %endpoint,
                        status,
                        "Notification delivered"
                    );
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        endpoint = %endpoint,
                        error = %e,
                        "Notification endpoint rejected payload, trying next"
                    );
                }
            }
        }

        tracing::error!(
            endpoints = self.endpoints.len(),
            event_id = %outcome.event_id,
            "All notification endpoints failed"
        );
        false
    }

    fn serialize_payload(&self, outcome: &JobOutcome) -> serde_json::Result<String> {
        match outcome.status {
            JobStatus::Completed => serde_json::to_string(&CompletionNotice {
                event_id: outcome.event_id.clone(),
                email: outcome.recipient_email.clone(),
                download_url: outcome.download_url.clone().unwrap_or_default(),
                file_count: outcome.succeeded_count,
                final_size_mb: round2(outcome.archive_bytes as f64 / (1024.0 * 1024.0)),
                processing_time_seconds: outcome.processing_time_seconds,
                request_id: outcome.request_id.clone(),
                skipped_files: outcome
                    .skipped_file_names()
                    .into_iter()
                    .map(String::from)
                    .collect(),
            }),
            JobStatus::Failed => serde_json::to_string(&FailureNotice {
                event_id: outcome.event_id.clone(),
                email: outcome.recipient_email.clone(),
                error: outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
                is_error: true,
                request_id: outcome.request_id.clone(),
            }),
        }
    }

    async fn post(&self, endpoint: &str, body: &str) -> Result<u16, String> {
        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(format!("status {}: {}", status.as_u16(), body))
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
