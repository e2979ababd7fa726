//! Callbridge relay server library logic.

pub mod api_inbound;
pub mod api_outbound;
pub mod api_sessions;
pub mod authz;
pub mod config;
pub mod relay;
pub mod webhook;

use authz::{CallerDirectory, HttpCallerDirectory};
use axum::{
    http::{header, HeaderMap},
    routing::{get, post},
    Extension, Json, Router,
};
use callbridge_session::SessionRegistry;
use callbridge_telephony::{CallPlacer, TelephonyError, TwilioClient};
use callbridge_voice::{ElevenLabsClient, VoiceConnector, VoiceError};
use config::Config;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use webhook::{SessionNotifier, WebhookNotifier};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Active call sessions.
    pub registry: SessionRegistry,
    /// Opens voice-AI sessions.
    pub voice: Arc<dyn VoiceConnector>,
    /// Caller authorization lookup.
    pub callers: Arc<dyn CallerDirectory>,
    /// Session-end notifications.
    pub notifier: Arc<dyn SessionNotifier>,
    /// Outbound call placement.
    pub calls: Arc<dyn CallPlacer>,
    /// Host used in generated stream and callback URLs; falls back to the
    /// request's `Host` header.
    pub public_host: Option<String>,
    /// Bound on draining a voice link or telephony writer during teardown.
    pub close_grace: Duration,
    /// Flipped to `true` when the process is shutting down.
    pub shutdown: Arc<watch::Sender<bool>>,
}

/// Errors building the application state.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("voice client: {0}")]
    Voice(#[from] VoiceError),

    #[error("telephony client: {0}")]
    Telephony(#[from] TelephonyError),

    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

impl AppState {
    /// Builds the production state from configuration.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            registry: SessionRegistry::new(),
            voice: Arc::new(ElevenLabsClient::new(config.voice.clone())?),
            callers: Arc::new(HttpCallerDirectory::new(&config.authz)?),
            notifier: Arc::new(WebhookNotifier::new(config.webhook.clone())?),
            calls: Arc::new(TwilioClient::new(config.telephony.clone())?),
            public_host: config.server.public_host.clone(),
            close_grace: Duration::from_millis(config.voice.close_grace_ms),
            shutdown: Arc::new(shutdown),
        })
    }

    /// Signals every active relay to tear down.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Host name for URLs handed to the telephony provider.
    pub fn public_host(&self, headers: &HeaderMap) -> String {
        if let Some(host) = &self.public_host {
            return host.clone();
        }
        headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .filter(|host| !host.is_empty())
            .unwrap_or("localhost")
            .to_string()
    }
}

/// Health check handler.
async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.registry.len(),
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/incoming-call-eleven",
            get(api_inbound::incoming_call_handler).post(api_inbound::incoming_call_handler),
        )
        .route("/media-stream", get(api_inbound::media_stream_handler))
        .route("/outbound-call", post(api_outbound::outbound_call_handler))
        .route(
            "/outbound-call-twiml",
            get(api_outbound::outbound_twiml_handler).post(api_outbound::outbound_twiml_handler),
        )
        .route(
            "/outbound-media-stream",
            get(api_outbound::outbound_media_stream_handler),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        // Operator introspection stays same-origin.
        .merge(
            Router::new()
                .route("/api/sessions", get(api_sessions::list_sessions_handler))
                .route("/api/sessions/{key}", get(api_sessions::get_session_handler)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
