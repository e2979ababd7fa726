use crate::config::VoiceConfig;
use crate::error::VoiceError;
use crate::initiation::ConversationRequest;
use crate::link::{VoiceBridge, VoiceLink};
use async_trait::async_trait;
use futures_util::SinkExt;
use serde::Deserialize;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SIGNED_URL_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens voice-AI sessions.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    /// Connects, sends the initiation message for `request`, and starts the
    /// link task that delivers provider events through `bridge`.
    async fn open(
        &self,
        request: &ConversationRequest,
        bridge: VoiceBridge,
    ) -> Result<VoiceLink, VoiceError>;
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    signed_url: String,
}

/// Client for the ElevenLabs conversational agent socket.
#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    config: VoiceConfig,
    http: reqwest::Client,
}

impl ElevenLabsClient {
    pub fn new(config: VoiceConfig) -> Result<Self, VoiceError> {
        let http = reqwest::Client::builder()
            .timeout(SIGNED_URL_TIMEOUT)
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    /// Requests a short-lived, pre-authenticated socket URL for the agent.
    pub async fn signed_url(&self) -> Result<String, VoiceError> {
        if self.config.agent_id.is_empty() || self.config.api_key.is_empty() {
            return Err(VoiceError::Config(
                "voice agent id and API key are required".to_string(),
            ));
        }

        let url = format!(
            "{}/v1/convai/conversation/get_signed_url",
            self.config.api_base.trim_end_matches('/')
        );
        let response = self
            .http
            .get(&url)
            .query(&[("agent_id", self.config.agent_id.as_str())])
            .header("xi-api-key", &self.config.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoiceError::SignedUrlRejected(status.as_u16()));
        }

        let body: SignedUrlResponse = response.json().await?;
        Ok(body.signed_url)
    }
}

#[async_trait]
impl VoiceConnector for ElevenLabsClient {
    async fn open(
        &self,
        request: &ConversationRequest,
        bridge: VoiceBridge,
    ) -> Result<VoiceLink, VoiceError> {
        let signed_url = self.signed_url().await?;
        let (mut socket, _) = connect_async(signed_url.as_str()).await?;

        socket
            .send(Message::text(request.initiation_message().to_json()))
            .await?;

        tracing::info!(
            stream_sid = %bridge.stream_sid,
            profiled = request.caller_profile.is_some(),
            "voice session opened"
        );

        Ok(VoiceLink::spawn(socket, bridge))
    }
}
