//! Session-end notifications to the automation webhook.

use crate::config::WebhookConfig;
use async_trait::async_trait;
use callbridge_types::CallReport;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook rejected report with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("webhook base url is not configured")]
    NotConfigured,
}

/// Delivers call reports downstream. Never retried.
#[async_trait]
pub trait SessionNotifier: Send + Sync {
    async fn notify(&self, channel: &str, report: &CallReport) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    config: WebhookConfig,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { config, http })
    }

    fn authorization(&self) -> String {
        if self.config.bearer {
            format!("Bearer {}", self.config.auth_token)
        } else {
            self.config.auth_token.clone()
        }
    }
}

#[async_trait]
impl SessionNotifier for WebhookNotifier {
    async fn notify(&self, channel: &str, report: &CallReport) -> Result<(), NotifyError> {
        if self.config.base_url.is_empty() {
            return Err(NotifyError::NotConfigured);
        }

        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), channel);
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(report)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(
            channel = channel,
            call_sid = %report.call_sid,
            conversation_id = %report.conversation_id,
            "call report delivered"
        );
        Ok(())
    }
}
