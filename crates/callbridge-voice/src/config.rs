use serde::{Deserialize, Serialize};
use std::fmt;

fn default_api_base() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_close_grace_ms() -> u64 {
    2000
}

/// Voice-AI provider settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// How long a closing link may take to drain before its task is aborted.
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            agent_id: String::new(),
            api_key: String::new(),
            close_grace_ms: default_close_grace_ms(),
        }
    }
}

impl fmt::Debug for VoiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceConfig")
            .field("api_base", &self.api_base)
            .field("agent_id", &self.agent_id)
            .field("api_key", &"[REDACTED]")
            .field("close_grace_ms", &self.close_grace_ms)
            .finish()
    }
}

impl VoiceConfig {
    pub fn new(agent_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}
