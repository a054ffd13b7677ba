use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::config::AppConfig;
use crate::server::handlers::{chat, health, news, sessions};
use crate::state::AppState;

/// Creates the application router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.config);

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/news", get(news::get_news))
        .route("/query-news", get(news::query_news))
        .route("/session/history", get(sessions::get_session_history))
        .route("/session/new", post(sessions::new_session))
        .route("/session/chat/stream", post(chat::chat_stream))
        .route("/get-session-list", get(sessions::list_sessions))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static(sessions::SESSION_HEADER),
        ])
}
