//! Outbound call handlers: placement, the instruction callback, and the
//! resulting media stream.

use crate::relay::{self, PARAM_NUMBER, PARAM_PROMPT};
use crate::AppState;
use axum::{
    extract::{Extension, Query, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use callbridge_telephony::{TelephonyError, TwimlResponse};
use callbridge_types::CallDirection;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Default, Deserialize)]
pub struct OutboundCallRequest {
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Error)]
pub enum OutboundCallError {
    #[error("phone number is required")]
    MissingNumber,

    #[error("failed to place call: {0}")]
    Telephony(#[from] TelephonyError),
}

impl IntoResponse for OutboundCallError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingNumber => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Phone number is required" })),
            )
                .into_response(),
            Self::Telephony(e) => {
                tracing::error!("error initiating outbound call: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "success": false, "error": "Failed to initiate call" })),
                )
                    .into_response()
            }
        }
    }
}

/// Asks the telephony provider to dial `request.number`, pointing it back at
/// the instruction callback on `host`. Returns the provider call id.
pub async fn initiate_call(
    state: &AppState,
    host: &str,
    request: &OutboundCallRequest,
) -> Result<String, OutboundCallError> {
    let number = request.number.trim();
    if number.is_empty() {
        return Err(OutboundCallError::MissingNumber);
    }

    let instructions_url = format!(
        "https://{}/outbound-call-twiml?prompt={}&number={}",
        host,
        urlencoding::encode(&request.prompt),
        urlencoding::encode(number)
    );
    let call_sid = state.calls.place_call(number, &instructions_url).await?;
    tracing::info!(call_sid = %call_sid, number = %number, "outbound call initiated");
    Ok(call_sid)
}

pub async fn outbound_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<OutboundCallRequest>,
) -> Result<impl IntoResponse, OutboundCallError> {
    let host = state.public_host(&headers);
    let call_sid = initiate_call(&state, &host, &request).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Call initiated",
        "callSid": call_sid,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct OutboundTwimlParams {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub number: String,
}

/// Instruction callback for a placed call: open the outbound media stream.
pub async fn outbound_twiml_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<OutboundTwimlParams>,
) -> impl IntoResponse {
    let url = format!("wss://{}/outbound-media-stream", state.public_host(&headers));
    let twiml = TwimlResponse::new().connect_stream(
        url,
        [(PARAM_PROMPT, params.prompt), (PARAM_NUMBER, params.number)],
    );
    ([(header::CONTENT_TYPE, "text/xml")], twiml.render())
}

pub async fn outbound_media_stream_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay::run_socket(socket, state, CallDirection::Outbound))
}
