use callbridge_types::{CallDirection, CallReport, CallerProfile};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// State for one active call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub direction: CallDirection,
    /// Media stream identifier assigned by the telephony provider.
    pub stream_sid: String,
    /// Call identifier assigned by the telephony provider.
    pub call_sid: String,
    /// Voice-AI conversation identifier; `None` until negotiation completes.
    pub conversation_id: Option<String>,
    /// Serialized with all but the last four characters masked.
    #[serde(serialize_with = "serialize_masked")]
    pub counterparty_phone: String,
    /// Never serialized: the profile is personal data and only feeds the agent.
    #[serde(skip_serializing)]
    pub caller_profile: Option<CallerProfile>,
    pub disconnecting: bool,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        direction: CallDirection,
        stream_sid: impl Into<String>,
        call_sid: impl Into<String>,
        counterparty_phone: impl Into<String>,
        caller_profile: Option<CallerProfile>,
    ) -> Self {
        Self {
            direction,
            stream_sid: stream_sid.into(),
            call_sid: call_sid.into(),
            conversation_id: None,
            counterparty_phone: counterparty_phone.into(),
            caller_profile,
            disconnecting: false,
            started_at: Utc::now(),
        }
    }

    /// The registry key for this session: stream id inbound, call id outbound.
    pub fn key(&self) -> &str {
        match self.direction {
            CallDirection::Inbound => &self.stream_sid,
            CallDirection::Outbound => &self.call_sid,
        }
    }

    /// Builds the termination payload for the automation webhook.
    pub fn report(&self) -> CallReport {
        CallReport {
            conversation_id: self.conversation_id.clone().unwrap_or_default(),
            phone_number: self.counterparty_phone.clone(),
            call_sid: self.key().to_string(),
        }
    }
}

fn serialize_masked<S: Serializer>(phone: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&mask_phone(phone))
}

/// Replaces every character but the last four with `*`.
pub fn mask_phone(phone: &str) -> String {
    let count = phone.chars().count();
    phone
        .chars()
        .enumerate()
        .map(|(i, c)| if i + 4 < count { '*' } else { c })
        .collect()
}
