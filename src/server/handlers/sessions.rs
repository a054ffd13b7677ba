use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::state::AppState;

pub const SESSION_HEADER: &str = "x-session-id";

pub fn session_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)?
        .to_str()
        .ok()
        .map(str::to_string)
        .filter(|id| !id.is_empty())
}

pub async fn new_session(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let session_id = state.sessions.create_session().await?;
    Ok(Json(json!({
        "session_id": session_id,
        "message": "New session created and set as default."
    })))
}

/// History for the session named in the header. A missing header, an unknown
/// id, and an expired session all read as an empty history.
pub async fn get_session_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let history = match session_id_from(&headers) {
        Some(session_id) => state.sessions.fetch_history(&session_id).await?,
        None => Vec::new(),
    };
    Ok(Json(json!({"history": history})))
}

pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let sessions = state.sessions.list_sessions().await?;
    Ok(Json(json!({"sessions": sessions})))
}
