//! Composition of the conversation initiation message.

use crate::messages::{
    AgentOverride, ClientData, ClientMessage, ConfigOverride, InitiationData, PromptOverride,
};
use callbridge_types::CallerProfile;
use std::collections::BTreeMap;

/// Opening utterance spoken by the agent.
pub const FIRST_MESSAGE: &str = "Hello, do you have a moment to talk?";

/// Instructions used when no caller profile is available.
pub const GENERIC_PROMPT: &str = "You are a customer service representative";

/// Caller context for one voice-AI session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationRequest {
    pub counterparty_phone: String,
    pub caller_profile: Option<CallerProfile>,
    /// Free-form instructions appended to the composed prompt.
    pub prompt: Option<String>,
}

impl ConversationRequest {
    pub fn new(counterparty_phone: impl Into<String>, caller_profile: Option<CallerProfile>) -> Self {
        Self {
            counterparty_phone: counterparty_phone.into(),
            caller_profile,
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    /// Builds the initiation data sent as the first frame on the socket.
    pub fn initiation(&self) -> InitiationData {
        let Some(profile) = &self.caller_profile else {
            return InitiationData {
                conversation_config_override: agent_override(GENERIC_PROMPT.to_string()),
                client_data: None,
            };
        };

        let subject_id = profile.subject_id().unwrap_or_default();
        let mut prompt = format!(
            "You are a customer service representative AI agent.\n\
             Context about the call:\n\
             Debtor ID: {}\n\
             Caller Phone: {}",
            subject_id, self.counterparty_phone
        );
        if let Some(extra) = &self.prompt {
            prompt.push_str("\n\n");
            prompt.push_str(extra);
        }

        let dynamic_variables = BTreeMap::from([
            ("caller_phone".to_string(), self.counterparty_phone.clone()),
            ("debtor_id".to_string(), subject_id),
        ]);

        InitiationData {
            conversation_config_override: agent_override(prompt),
            client_data: Some(ClientData { dynamic_variables }),
        }
    }

    pub fn initiation_message(&self) -> ClientMessage {
        ClientMessage::initiation(self.initiation())
    }
}

fn agent_override(prompt: String) -> ConfigOverride {
    ConfigOverride {
        agent: AgentOverride {
            prompt: PromptOverride { prompt },
            first_message: FIRST_MESSAGE.to_string(),
        },
    }
}
