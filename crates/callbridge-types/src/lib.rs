//! Shared types for the callbridge relay.
//!
//! This crate holds the small vocabulary every other crate speaks: which way
//! a call flows, the caller profile returned by the authorization lookup, and
//! the report emitted when a call ends. It has no behaviour of its own beyond
//! accessors, which keeps the dependency graph flat.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Profile field carrying the authorization-subject identifier.
pub const SUBJECT_ID_FIELD: &str = "debtor_id";

/// Direction of a bridged call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// The counterparty dialled in.
    Inbound,
    /// The service dialled the counterparty.
    Outbound,
}

impl CallDirection {
    /// Automation webhook channel that receives this direction's call reports.
    pub fn webhook_channel(self) -> &'static str {
        match self {
            Self::Inbound => "inbound-calls",
            Self::Outbound => "outbound-calls",
        }
    }

    /// Returns the lowercase label for this direction.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque caller profile returned by the authorization collaborator.
///
/// The relay never interprets the profile beyond [`CallerProfile::subject_id`];
/// everything else is passed through to the voice agent untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerProfile(Map<String, Value>);

impl CallerProfile {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Builds a profile from an arbitrary JSON value.
    ///
    /// Only JSON objects are profiles; `null`, arrays and scalars yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Parses a profile from its serialized JSON form.
    pub fn from_json(raw: &str) -> Result<Option<Self>, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_value(value))
    }

    /// Serializes the profile to compact JSON.
    pub fn to_json(&self) -> String {
        // A map of JSON values always serializes.
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Returns a field by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns the authorization-subject identifier.
    ///
    /// Numeric identifiers are rendered in their decimal form; any other
    /// non-string value is treated as absent.
    pub fn subject_id(&self) -> Option<String> {
        match self.0.get(SUBJECT_ID_FIELD)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Termination payload posted to the automation webhook when a call ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReport {
    /// Voice-AI conversation identifier, empty when negotiation never completed.
    pub conversation_id: String,
    /// Counterparty phone number.
    pub phone_number: String,
    /// Telephony identifier the session was keyed by.
    pub call_sid: String,
}
