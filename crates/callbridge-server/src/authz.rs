//! Caller authorization lookup.

use crate::config::AuthzConfig;
use async_trait::async_trait;
use callbridge_types::CallerProfile;
use serde_json::{json, Value};
use std::time::Duration;

/// Resolves a phone number to a caller profile.
#[async_trait]
pub trait CallerDirectory: Send + Sync {
    /// Returns the caller's profile, or `None` when the caller is not
    /// authorized or the lookup failed.
    async fn lookup(&self, phone: &str) -> Option<CallerProfile>;
}

/// Authorization lookup against the automation system.
///
/// `POST {url}` with `{"phone": ..}`. A `200` carrying a JSON object is a
/// profile; any other status, body or transport failure means unauthorized.
#[derive(Debug, Clone)]
pub struct HttpCallerDirectory {
    url: String,
    http: reqwest::Client,
}

impl HttpCallerDirectory {
    pub fn new(config: &AuthzConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            url: config.url.clone(),
            http,
        })
    }
}

#[async_trait]
impl CallerDirectory for HttpCallerDirectory {
    async fn lookup(&self, phone: &str) -> Option<CallerProfile> {
        if self.url.is_empty() {
            tracing::warn!("authorization url not configured, treating caller as unauthorized");
            return None;
        }

        let response = match self
            .http
            .post(&self.url)
            .json(&json!({ "phone": phone }))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(phone = %phone, "authorization lookup failed: {}", e);
                return None;
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            tracing::info!(
                phone = %phone,
                status = response.status().as_u16(),
                "caller not authorized"
            );
            return None;
        }

        match response.json::<Value>().await {
            Ok(body) => {
                let profile = CallerProfile::from_value(body);
                if profile.is_none() {
                    tracing::warn!(phone = %phone, "authorization response was not a JSON object");
                }
                profile
            }
            Err(e) => {
                tracing::warn!(phone = %phone, "unreadable authorization response: {}", e);
                None
            }
        }
    }
}
