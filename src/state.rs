use std::sync::Arc;

use crate::chat::ChatService;
use crate::core::config::{AppConfig, AppPaths};
use crate::core::errors::ApiError;
use crate::history::SessionStore;
use crate::ingest::FeedIngestor;
use crate::llm::{GeminiProvider, LlmProvider};
use crate::rag::store::{Article, ArticleStore};
use crate::rag::{sqlite, NewsIndex, SqliteArticleStore};

/// Application state shared across all routes and background tasks.
///
/// Everything is built once at process start and injected into handlers;
/// there are no process-wide mutable clients.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn ArticleStore>,
    pub sessions: SessionStore,
    pub index: NewsIndex,
    pub chat: ChatService,
    pub ingestor: FeedIngestor,
}

impl AppState {
    pub async fn initialize(config: AppConfig, paths: &AppPaths) -> Result<Arc<Self>, ApiError> {
        let llm: Arc<dyn LlmProvider> = Arc::new(GeminiProvider::new(&config));
        Self::with_provider(config, paths, llm).await
    }

    /// Build the state around an explicit provider. Tests inject fakes here.
    pub async fn with_provider(
        config: AppConfig,
        paths: &AppPaths,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Arc<Self>, ApiError> {
        let pool = sqlite::connect(&paths.db_path).await?;

        let sessions = SessionStore::new(pool.clone(), config.session_ttl).await?;
        let store: Arc<dyn ArticleStore> = Arc::new(SqliteArticleStore::new(pool));
        let index = NewsIndex::new(store.clone(), llm.clone(), &config);
        let chat = ChatService::new(index.clone(), llm, &config);
        let ingestor = FeedIngestor::new(store.clone(), &config);

        Ok(Arc::new(AppState {
            config,
            store,
            sessions,
            index,
            chat,
            ingestor,
        }))
    }

    /// Startup pipeline: one ingestion pass, then embedding. Best-effort —
    /// a failure leaves the service running against an empty or stale index.
    pub async fn bootstrap_index(&self) {
        tracing::info!("Starting background news fetch & embedding");

        let articles = match self.ingestor.fetch_news().await {
            Ok(articles) => articles,
            Err(err) => {
                tracing::warn!("Startup ingestion failed: {}", err);
                return;
            }
        };

        if let Err(err) = self.embed_articles(&articles).await {
            tracing::warn!("Failed to embed articles: {}", err);
        }
    }

    async fn embed_articles(&self, articles: &[Article]) -> Result<(), ApiError> {
        self.index.ensure_index().await?;
        let stored = self.index.index_articles(articles).await?;
        tracing::info!("Embedded {} articles on startup", stored);
        Ok(())
    }
}
