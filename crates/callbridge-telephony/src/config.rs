use serde::{Deserialize, Serialize};
use std::fmt;

fn default_api_base() -> String {
    "https://api.twilio.com".to_string()
}

/// Credentials and endpoints for the telephony REST API.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub account_sid: String,
    #[serde(default, skip_serializing)]
    pub auth_token: String,
    /// Caller ID used for outbound calls.
    #[serde(default)]
    pub phone_number: String,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            account_sid: String::new(),
            auth_token: String::new(),
            phone_number: String::new(),
        }
    }
}

impl fmt::Debug for TelephonyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelephonyConfig")
            .field("api_base", &self.api_base)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("phone_number", &self.phone_number)
            .finish()
    }
}

impl TelephonyConfig {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        phone_number: impl Into<String>,
    ) -> Self {
        Self {
            api_base: default_api_base(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            phone_number: phone_number.into(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}
