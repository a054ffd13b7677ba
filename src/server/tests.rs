use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::chat::NO_ARTICLES_REPLY;
use crate::core::config::{AppConfig, AppPaths};
use crate::rag::{Article, ArticleStore};
use crate::server::router::router;
use crate::state::AppState;
use crate::testing::FakeLlm;

struct TestApp {
    base_url: String,
    state: Arc<AppState>,
    client: reqwest::Client,
    _data_dir: tempfile::TempDir,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn new_session(&self) -> String {
        let payload: Value = self
            .client
            .post(self.url("/session/new"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        payload["session_id"].as_str().unwrap().to_string()
    }

    async fn history(&self, session_id: &str) -> Value {
        self.client
            .get(self.url("/session/history"))
            .header("x-session-id", session_id)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

async fn spawn_app(config: AppConfig) -> TestApp {
    let data_dir = tempfile::tempdir().unwrap();
    let paths = AppPaths {
        data_dir: data_dir.path().to_path_buf(),
        log_dir: data_dir.path().join("logs"),
        db_path: data_dir.path().join("newswire.db"),
    };

    let llm = Arc::new(FakeLlm::new(config.embed_dim));
    let state = AppState::with_provider(config, &paths, llm).await.unwrap();
    state.index.ensure_index().await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            panic!("test server error: {err}");
        }
    });

    TestApp {
        base_url: format!("http://{}", addr),
        state,
        client: reqwest::Client::new(),
        _data_dir: data_dir,
    }
}

fn seeded_article() -> Article {
    Article {
        title: "Rocket Launch Succeeds".to_string(),
        text: "A rocket launched into orbit this morning carrying a new satellite.".to_string(),
        url: "https://example.com/rocket-launch".to_string(),
    }
}

#[tokio::test]
async fn chat_stream_round_trip_grounds_and_persists() {
    let app = spawn_app(AppConfig::for_tests()).await;
    app.state
        .index
        .index_articles(&[seeded_article()])
        .await
        .unwrap();

    let session_id = app.new_session().await;

    let streamed = app
        .client
        .post(app.url("/session/chat/stream"))
        .header("x-session-id", &session_id)
        .json(&serde_json::json!({"message": "what happened with the rocket launch into orbit?"}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(streamed.contains("Rocket Launch Succeeds"));
    assert!(streamed.contains("https://example.com/rocket-launch"));

    // The relay persists the assistant turn after the body finishes; give it
    // a moment to commit.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let payload = app.history(&session_id).await;
    let history = payload["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["role"], "user");
    assert_eq!(
        history[0]["content"],
        "what happened with the rocket launch into orbit?"
    );
    assert_eq!(history[1]["role"], "assistant");
    assert_eq!(history[1]["content"].as_str().unwrap(), streamed);
}

#[tokio::test]
async fn empty_message_is_rejected_and_appends_nothing() {
    let app = spawn_app(AppConfig::for_tests()).await;
    let session_id = app.new_session().await;

    let payload: Value = app
        .client
        .post(app.url("/session/chat/stream"))
        .header("x-session-id", &session_id)
        .json(&serde_json::json!({"message": ""}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(payload["error"], "Message is required.");

    let history = app.history(&session_id).await;
    assert_eq!(history["history"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn chat_without_articles_streams_the_fallback() {
    let app = spawn_app(AppConfig::for_tests()).await;
    let session_id = app.new_session().await;

    let streamed = app
        .client
        .post(app.url("/session/chat/stream"))
        .header("x-session-id", &session_id)
        .json(&serde_json::json!({"message": "anything"}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(streamed, NO_ARTICLES_REPLY);
}

#[tokio::test]
async fn query_news_requires_a_query_string() {
    let app = spawn_app(AppConfig::for_tests()).await;

    let payload: Value = app
        .client
        .get(app.url("/query-news"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(payload["error"], "Query string 'q' is required.");
}

#[tokio::test]
async fn query_news_returns_seeded_results() {
    let app = spawn_app(AppConfig::for_tests()).await;
    app.state
        .index
        .index_articles(&[seeded_article()])
        .await
        .unwrap();

    let payload: Value = app
        .client
        .get(app.url("/query-news?q=rocket%20orbit&k=2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let results = payload["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["title"], "Rocket Launch Succeeds");
}

#[tokio::test]
async fn news_endpoint_serves_the_cache() {
    let app = spawn_app(AppConfig::for_tests()).await;

    let empty: Value = app
        .client
        .get(app.url("/news"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(empty["news"].as_array().unwrap().len(), 0);

    app.state
        .store
        .cache_news(&[seeded_article()], Duration::from_secs(60))
        .await
        .unwrap();

    let cached: Value = app
        .client
        .get(app.url("/news"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let news = cached["news"].as_array().unwrap();
    assert_eq!(news.len(), 1);
    assert_eq!(news[0]["title"], "Rocket Launch Succeeds");
}

#[tokio::test]
async fn session_list_reports_each_session_with_its_last_message() {
    let app = spawn_app(AppConfig::for_tests()).await;
    let session_id = app.new_session().await;
    app.state
        .sessions
        .append_message(&session_id, "user", "hello there")
        .await
        .unwrap();

    let payload: Value = app
        .client
        .get(app.url("/get-session-list"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let sessions = payload["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["session_id"], session_id.as_str());
    assert_eq!(sessions[0]["last_message"], "hello there");
}
