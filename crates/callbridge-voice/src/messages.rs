//! Voice-AI provider socket protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Event received from the voice-AI provider, discriminated by `type`.
///
/// Discriminators the relay does not act on (transcripts, agent responses,
/// VAD scores, ...) decode to [`ProviderEvent::Unhandled`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    Audio {
        audio_event: AudioEvent,
    },
    ConversationInitiationMetadata {
        conversation_initiation_metadata_event: ConversationMetadata,
    },
    /// The caller spoke over the agent.
    Interruption,
    /// The agent finished the conversation; the call should end.
    EndOfConversation,
    Ping {
        ping_event: PingEvent,
    },
    #[serde(other)]
    Unhandled,
}

impl ProviderEvent {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Returns the raw `type` discriminator of a frame, for logging.
pub fn discriminator(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value.get("type")?.as_str().map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AudioEvent {
    pub audio_base_64: String,
    #[serde(default)]
    pub event_id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationMetadata {
    pub conversation_id: String,
    #[serde(default)]
    pub agent_output_audio_format: Option<String>,
    #[serde(default)]
    pub user_input_audio_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PingEvent {
    /// Echoed back verbatim; the provider may send a number or a string.
    #[serde(default)]
    pub event_id: Option<Value>,
    #[serde(default)]
    pub ping_ms: Option<u64>,
}

/// Frame sent to the voice-AI provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// Caller audio, base64 encoded. The provider expects this one untagged.
    UserAudio { user_audio_chunk: String },
    Typed(TypedMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypedMessage {
    ConversationInitiationClientData(InitiationData),
    Pong { event_id: Value },
    EndConversation,
}

/// Body of the `conversation_initiation_client_data` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitiationData {
    pub conversation_config_override: ConfigOverride,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_data: Option<ClientData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigOverride {
    pub agent: AgentOverride,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentOverride {
    pub prompt: PromptOverride,
    pub first_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptOverride {
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientData {
    /// Values exposed to the provider's own prompt templating.
    pub dynamic_variables: BTreeMap<String, String>,
}

impl ClientMessage {
    pub fn user_audio(chunk: impl Into<String>) -> Self {
        Self::UserAudio {
            user_audio_chunk: chunk.into(),
        }
    }

    pub fn pong(event_id: Value) -> Self {
        Self::Typed(TypedMessage::Pong { event_id })
    }

    pub fn end_conversation() -> Self {
        Self::Typed(TypedMessage::EndConversation)
    }

    pub fn initiation(data: InitiationData) -> Self {
        Self::Typed(TypedMessage::ConversationInitiationClientData(data))
    }

    pub fn to_json(&self) -> String {
        // Strings and string maps only; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
