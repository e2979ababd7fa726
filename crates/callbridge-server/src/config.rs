//! Relay configuration loading from file and environment variables.

use callbridge_telephony::TelephonyConfig;
use callbridge_voice::VoiceConfig;
use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Voice-AI provider credentials.
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Telephony provider credentials.
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Caller authorization lookup.
    #[serde(default)]
    pub authz: AuthzConfig,

    /// Session-end notifications.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public host name used in stream and callback URLs. When unset, the
    /// request's `Host` header is used.
    #[serde(default)]
    pub public_host: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "callbridge_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Caller authorization collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthzConfig {
    /// Endpoint receiving `POST {"phone": ..}`.
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

/// Automation webhook that receives session-end reports.
#[derive(Clone, Deserialize)]
pub struct WebhookConfig {
    /// Base URL; reports are posted to `{base_url}/{channel}`.
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub auth_token: String,

    /// Prefix the token with `Bearer ` in the `Authorization` header.
    #[serde(default)]
    pub bearer: bool,

    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &"[REDACTED]")
            .field("bearer", &self.bearer)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_host: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_token: String::new(),
            bearer: false,
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Required settings are empty.
    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

impl Config {
    /// Reports every required setting that is still empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("voice.api_key (ELEVENLABS_API_KEY)", &self.voice.api_key),
            ("voice.agent_id (ELEVENLABS_AGENT_ID)", &self.voice.agent_id),
            (
                "telephony.account_sid (TWILIO_ACCOUNT_SID)",
                &self.telephony.account_sid,
            ),
            (
                "telephony.auth_token (TWILIO_AUTH_TOKEN)",
                &self.telephony.auth_token,
            ),
            (
                "telephony.phone_number (TWILIO_PHONE_NUMBER)",
                &self.telephony.phone_number,
            ),
            ("webhook.auth_token (N8N_AUTH_TOKEN)", &self.webhook.auth_token),
            ("webhook.base_url (CALLBRIDGE_WEBHOOK_URL)", &self.webhook.base_url),
            ("authz.url (CALLBRIDGE_AUTHZ_URL)", &self.authz.url),
        ];

        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CALLBRIDGE_HOST` overrides `server.host`
/// - `CALLBRIDGE_PORT` overrides `server.port`
/// - `CALLBRIDGE_PUBLIC_HOST` overrides `server.public_host`
/// - `CALLBRIDGE_LOG_LEVEL` overrides `logging.level`
/// - `CALLBRIDGE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `ELEVENLABS_API_KEY` / `ELEVENLABS_AGENT_ID` / `ELEVENLABS_API_BASE`
///   override `voice.*`
/// - `TWILIO_ACCOUNT_SID` / `TWILIO_AUTH_TOKEN` / `TWILIO_PHONE_NUMBER`
///   override `telephony.*`
/// - `N8N_AUTH_TOKEN` overrides `webhook.auth_token`
/// - `CALLBRIDGE_WEBHOOK_URL` overrides `webhook.base_url`
/// - `CALLBRIDGE_AUTHZ_URL` overrides `authz.url`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, env: impl Fn(&str) -> Option<String>) {
    if let Some(host) = env("CALLBRIDGE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = env("CALLBRIDGE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(public_host) = env("CALLBRIDGE_PUBLIC_HOST") {
        config.server.public_host = Some(public_host).filter(|h| !h.trim().is_empty());
    }
    if let Some(level) = env("CALLBRIDGE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = env("CALLBRIDGE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    let strings: [(&str, &mut String); 9] = [
        ("ELEVENLABS_API_KEY", &mut config.voice.api_key),
        ("ELEVENLABS_AGENT_ID", &mut config.voice.agent_id),
        ("TWILIO_ACCOUNT_SID", &mut config.telephony.account_sid),
        ("TWILIO_AUTH_TOKEN", &mut config.telephony.auth_token),
        ("TWILIO_PHONE_NUMBER", &mut config.telephony.phone_number),
        ("N8N_AUTH_TOKEN", &mut config.webhook.auth_token),
        ("CALLBRIDGE_WEBHOOK_URL", &mut config.webhook.base_url),
        ("CALLBRIDGE_AUTHZ_URL", &mut config.authz.url),
        ("ELEVENLABS_API_BASE", &mut config.voice.api_base),
    ];
    for (key, slot) in strings {
        if let Some(value) = env(key) {
            *slot = value;
        }
    }
}
