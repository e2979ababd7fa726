//! Inbound call handlers: the call-setup callback and its media stream.

use crate::relay::{self, PARAM_CALLER_PHONE, PARAM_USER_DATA};
use crate::AppState;
use axum::{
    extract::{rejection::FormRejection, Extension, Form, WebSocketUpgrade},
    http::{header, HeaderMap},
    response::IntoResponse,
};
use callbridge_telephony::TwimlResponse;
use callbridge_types::CallDirection;
use serde::Deserialize;
use std::sync::Arc;

/// Spoken to callers the authorization lookup does not recognise.
pub const REJECTION_MESSAGE: &str = "Sorry, you are not authorized to make this call.";

/// Call-setup callback fields the relay reads.
#[derive(Debug, Default, Deserialize)]
pub struct IncomingCallForm {
    #[serde(rename = "From", default)]
    pub from: String,
}

/// Answers an inbound call with stream instructions, or rejects the caller.
pub async fn incoming_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    form: Result<Form<IncomingCallForm>, FormRejection>,
) -> impl IntoResponse {
    let caller_phone = match form {
        Ok(Form(form)) => form.from,
        Err(e) => {
            tracing::warn!("unreadable call-setup callback: {}", e);
            String::new()
        }
    };
    tracing::info!(caller_phone = %caller_phone, "incoming call");

    let profile = if caller_phone.is_empty() {
        None
    } else {
        state.callers.lookup(&caller_phone).await
    };

    let twiml = match profile {
        None => {
            tracing::info!(caller_phone = %caller_phone, "rejecting unauthorized caller");
            TwimlResponse::new().say(REJECTION_MESSAGE).hangup()
        }
        Some(profile) => {
            let url = format!("wss://{}/media-stream", state.public_host(&headers));
            let user_data = urlencoding::encode(&profile.to_json()).into_owned();
            TwimlResponse::new().connect_stream(
                url,
                [
                    (PARAM_CALLER_PHONE, caller_phone),
                    (PARAM_USER_DATA, user_data),
                ],
            )
        }
    };

    ([(header::CONTENT_TYPE, "text/xml")], twiml.render())
}

/// Upgrades the inbound media stream and hands it to the relay.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay::run_socket(socket, state, CallDirection::Inbound))
}
