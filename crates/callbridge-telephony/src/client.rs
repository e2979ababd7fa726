use crate::config::TelephonyConfig;
use crate::error::TelephonyError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Timeout for a single call-placement request.
const PLACE_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Places outbound calls.
#[async_trait]
pub trait CallPlacer: Send + Sync {
    /// Dials `to`, pointing the provider at `instructions_url` for the call's
    /// instructions. Returns the provider-assigned call identifier.
    async fn place_call(&self, to: &str, instructions_url: &str) -> Result<String, TelephonyError>;
}

#[derive(Debug, Deserialize)]
struct CreatedCall {
    sid: Option<String>,
}

/// REST client for the telephony provider.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    config: TelephonyConfig,
    http: reqwest::Client,
}

impl TwilioClient {
    pub fn new(config: TelephonyConfig) -> Result<Self, TelephonyError> {
        let http = reqwest::Client::builder()
            .timeout(PLACE_CALL_TIMEOUT)
            .build()?;
        Ok(Self { config, http })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.account_sid.is_empty() && !self.config.phone_number.is_empty()
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl CallPlacer for TwilioClient {
    async fn place_call(&self, to: &str, instructions_url: &str) -> Result<String, TelephonyError> {
        if !self.is_configured() {
            return Err(TelephonyError::Config(
                "account sid and phone number are required to place calls".to_string(),
            ));
        }

        let response = self
            .http
            .post(self.calls_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.phone_number.as_str()),
                ("Url", instructions_url),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreatedCall = response.json().await?;
        let sid = created.sid.ok_or(TelephonyError::MissingCallSid)?;
        tracing::info!(call_sid = %sid, "outbound call placed");
        Ok(sid)
    }
}
