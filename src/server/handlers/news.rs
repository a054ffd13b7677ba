use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::rag::store::ArticleStore;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryNewsParams {
    pub q: Option<String>,
    pub k: Option<usize>,
}

pub async fn get_news(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let news = state.store.cached_news().await?.unwrap_or_default();
    Ok(Json(json!({"news": news})))
}

/// Ad-hoc semantic query. Retrieval failures come back as a structured
/// `{error}` payload rather than an HTTP fault.
pub async fn query_news(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryNewsParams>,
) -> Json<Value> {
    let q = params.q.unwrap_or_default();
    if q.is_empty() {
        return Json(json!({"error": "Query string 'q' is required."}));
    }
    let k = params.k.unwrap_or(5);

    match state.index.search(&q, k).await {
        Ok(results) => Json(json!({"results": results})),
        Err(err) => Json(json!({"error": err.to_string()})),
    }
}
