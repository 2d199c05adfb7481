//! Report delivery
//!
//! Posts the markdown report to a Slack incoming webhook when the run's
//! overall severity reaches the configured minimum.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::config::defaults;
use crate::types::{RunSummary, Severity};

/// Report delivery errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Webhook returned status {status}: {body}")]
    Rejected { status: reqwest::StatusCode, body: String },
}

#[async_trait]
pub trait ReportNotifier: Send + Sync {
    async fn send(&self, report: &str) -> Result<(), NotifyError>;
}

/// Whether a run is bad enough to be announced.
pub fn should_notify(summary: &RunSummary, min_severity: Severity) -> bool {
    summary.overall() >= min_severity
}

pub struct SlackWebhookNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl SlackWebhookNotifier {
    pub fn new(webhook_url: &str) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(defaults::HTTP_REQUEST_TIMEOUT_MS))
            .user_agent(defaults::USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            webhook_url: webhook_url.to_string(),
        })
    }
}

#[async_trait]
impl ReportNotifier for SlackWebhookNotifier {
    async fn send(&self, report: &str) -> Result<(), NotifyError> {
        debug!(bytes = report.len(), "Posting report to webhook");
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&json!({ "text": report }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status,
                body: body.chars().take(200).collect(),
            });
        }
        info!("Report delivered to webhook");
        Ok(())
    }
}

/// Send `report` if the run qualifies. Returns whether it was sent.
pub async fn notify_if_needed(
    notifier: &dyn ReportNotifier,
    summary: &RunSummary,
    report: &str,
    min_severity: Severity,
) -> Result<bool, NotifyError> {
    if !should_notify(summary, min_severity) {
        debug!(overall = %summary.overall(), min = %min_severity, "Run below notification threshold");
        return Ok(false);
    }
    notifier.send(report).await?;
    Ok(true)
}
