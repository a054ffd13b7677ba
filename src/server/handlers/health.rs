use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn root() -> impl IntoResponse {
    Json(json!({"message": "backend running"}))
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let indexed_articles = state.index.record_count().await.unwrap_or(0);
    Json(json!({
        "status": "ok",
        "indexed_articles": indexed_articles
    }))
}
