//! Read-only view of active call sessions.

use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use callbridge_session::Session;
use serde_json::{json, Value};
use std::sync::Arc;

/// Lists active sessions, oldest first. Caller profiles are never included.
pub async fn list_sessions_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let sessions = state.registry.snapshot();
    Json(json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
}

pub async fn get_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<Session>, StatusCode> {
    state.registry.get(&key).map(Json).ok_or(StatusCode::NOT_FOUND)
}
