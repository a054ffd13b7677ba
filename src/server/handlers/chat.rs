use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use super::sessions::session_id_from;
use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatStreamBody {
    pub message: Option<String>,
}

/// One streamed chat turn: append the user message, forward the
/// orchestrator's fragments as a `text/plain` body, append the concatenated
/// assistant reply once the upstream stream finishes.
///
/// The relay keeps draining the model stream after a client disconnect —
/// forwarding stops, but the full reply still lands in history.
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatStreamBody>,
) -> Result<Response, ApiError> {
    let Some(session_id) = session_id_from(&headers) else {
        return Ok(Json(json!({"error": "Session id header is required."})).into_response());
    };

    let message = body.message.unwrap_or_default();
    if message.is_empty() {
        return Ok(Json(json!({"error": "Message is required."})).into_response());
    }

    state
        .sessions
        .append_message(&session_id, "user", &message)
        .await?;

    let mut upstream = state.chat.generate_response(&message).await?;

    let (body_tx, body_rx) = mpsc::channel::<Bytes>(32);
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut collected = String::new();
        let mut client_gone = false;

        while let Some(item) = upstream.recv().await {
            match item {
                Ok(fragment) => {
                    collected.push_str(&fragment);
                    if !client_gone && body_tx.send(Bytes::from(fragment)).await.is_err() {
                        client_gone = true;
                    }
                }
                Err(err) => {
                    tracing::warn!("Model stream failed mid-reply: {}", err);
                    break;
                }
            }
        }

        if let Err(err) = sessions
            .append_message(&session_id, "assistant", &collected)
            .await
        {
            tracing::warn!("Failed to persist assistant reply: {}", err);
        }
    });

    let stream = futures_util::stream::unfold(body_rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from_stream(stream))
        .map_err(ApiError::internal)
}
