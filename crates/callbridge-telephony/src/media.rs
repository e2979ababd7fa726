//! Media-stream socket protocol.
//!
//! The provider sends JSON text frames discriminated by `event`. Only
//! `start`, `media` and `stop` drive the relay; every other discriminator
//! decodes to [`TelephonyEvent::Ignored`] instead of failing.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accepts unpadded chunks and stray trailing bits.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Event received from the telephony media stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    Start { start: StreamStart },
    Media { media: MediaChunk },
    Stop,
    #[serde(other)]
    Ignored,
}

impl TelephonyEvent {
    /// Decodes one text frame.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Media { .. } => "media",
            Self::Stop => "stop",
            Self::Ignored => "ignored",
        }
    }
}

/// Payload of the `start` event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: String,
    /// `<Parameter>` values embedded by the instruction document.
    #[serde(default)]
    pub custom_parameters: BTreeMap<String, String>,
}

impl StreamStart {
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.custom_parameters.get(name).map(String::as_str)
    }
}

/// Payload of the `media` event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaChunk {
    /// Base64-encoded audio.
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
}

impl MediaChunk {
    /// Validates the payload as base64 and returns it in canonical padded form.
    /// Missing padding and non-zero trailing bits are tolerated.
    pub fn canonical_payload(&self) -> Result<String, base64::DecodeError> {
        let audio = LENIENT.decode(self.payload.as_bytes())?;
        Ok(STANDARD.encode(audio))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaPayload {
    pub payload: String,
}

/// Frame sent to the telephony media stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelephonyCommand {
    /// Audio to play to the caller.
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
    MarkDone {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
    /// Discards any audio the provider has buffered for playback.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
    /// Replaces the call's instructions mid-stream.
    Twiml {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        twiml: String,
    },
}

impl TelephonyCommand {
    pub fn media(stream_sid: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::Media {
            stream_sid: stream_sid.into(),
            media: MediaPayload {
                payload: payload.into(),
            },
        }
    }

    pub fn mark_done(stream_sid: impl Into<String>) -> Self {
        Self::MarkDone {
            stream_sid: stream_sid.into(),
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        Self::Clear {
            stream_sid: stream_sid.into(),
        }
    }

    pub fn hangup(stream_sid: impl Into<String>) -> Self {
        Self::Twiml {
            stream_sid: stream_sid.into(),
            twiml: crate::twiml::HANGUP_TWIML.to_string(),
        }
    }

    /// Encodes the command as a JSON text frame.
    pub fn to_json(&self) -> String {
        // Plain strings only; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
