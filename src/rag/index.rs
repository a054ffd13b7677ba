//! Embedding, indexing, and retrieval over the article store.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use super::store::{Article, ArticleRecord, ArticleStore, SearchHit};
use crate::core::config::AppConfig;
use crate::core::errors::ApiError;
use crate::llm::types::EmbeddingTask;
use crate::llm::LlmProvider;

/// Similarity index over the stored articles: owns embedding, schema
/// creation, and k-NN retrieval. Cheap to clone and share across handlers.
#[derive(Clone)]
pub struct NewsIndex {
    store: Arc<dyn ArticleStore>,
    llm: Arc<dyn LlmProvider>,
    embed_dim: usize,
    batch_size: usize,
    version_tag: String,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl NewsIndex {
    pub fn new(store: Arc<dyn ArticleStore>, llm: Arc<dyn LlmProvider>, config: &AppConfig) -> Self {
        let rpm = NonZeroU32::new(config.embed_requests_per_minute.max(1))
            .unwrap_or(NonZeroU32::MIN);
        // One cell per request, no burst: consecutive batches are forced to
        // pause so the remote embedding endpoint's per-minute ceiling holds.
        let quota = Quota::per_minute(rpm).allow_burst(NonZeroU32::MIN);

        Self {
            store,
            llm,
            embed_dim: config.embed_dim,
            batch_size: config.embed_batch_size.max(1),
            version_tag: config.index_version_tag(),
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Create the index schema if absent and reconcile the embedding-model
    /// version tag. Safe to call on every startup: an existing, matching
    /// index is left untouched; a tag mismatch wipes the records instead of
    /// letting searches silently mix incompatible vectors.
    pub async fn ensure_index(&self) -> Result<(), ApiError> {
        self.store.ensure_schema().await?;

        match self.store.index_version().await? {
            Some(tag) if tag == self.version_tag => {}
            Some(tag) => {
                tracing::warn!(
                    "Embedding model changed ({} -> {}); rebuilding article index",
                    tag,
                    self.version_tag
                );
                self.store.clear_records().await?;
                self.store.set_index_version(&self.version_tag).await?;
            }
            None => {
                self.store.set_index_version(&self.version_tag).await?;
            }
        }

        Ok(())
    }

    /// Embed every article and write the batch, keyed by offset. Returns the
    /// number of records stored.
    pub async fn index_articles(&self, articles: &[Article]) -> Result<usize, ApiError> {
        if articles.is_empty() {
            return Ok(0);
        }

        let mut records = Vec::with_capacity(articles.len());
        for batch in articles.chunks(self.batch_size) {
            self.limiter.until_ready().await;

            let texts: Vec<String> = batch.iter().map(|a| a.text.clone()).collect();
            let vectors = self.llm.embed(&texts, EmbeddingTask::Document).await?;
            if vectors.len() != batch.len() {
                return Err(ApiError::Internal(format!(
                    "Embedding provider returned {} vectors for {} articles",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (article, embedding) in batch.iter().zip(vectors) {
                if embedding.len() != self.embed_dim {
                    return Err(ApiError::Internal(format!(
                        "Embedding dimension {} does not match index dimension {}",
                        embedding.len(),
                        self.embed_dim
                    )));
                }
                records.push(ArticleRecord {
                    article: article.clone(),
                    embedding,
                });
            }
        }

        let stored = records.len();
        self.store.store_records(records).await?;
        tracing::info!("Stored {} articles in the index", stored);
        Ok(stored)
    }

    /// Top-k retrieval by ascending cosine distance. An empty index yields an
    /// empty result, never an error.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, ApiError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let vectors = self
            .llm
            .embed(&[query.to_string()], EmbeddingTask::Query)
            .await?;
        let query_embedding = vectors
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal("Embedding provider returned no vector".into()))?;
        if query_embedding.len() != self.embed_dim {
            return Err(ApiError::Internal(format!(
                "Query embedding dimension {} does not match index dimension {}",
                query_embedding.len(),
                self.embed_dim
            )));
        }

        self.store.knn(&query_embedding, k).await
    }

    pub async fn record_count(&self) -> Result<usize, ApiError> {
        self.store.record_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::sqlite::{connect, SqliteArticleStore};
    use crate::testing::FakeLlm;

    fn article(title: &str, text: &str) -> Article {
        Article {
            title: title.to_string(),
            text: text.to_string(),
            url: format!("https://example.com/{}", title),
        }
    }

    async fn test_index(config: &AppConfig) -> NewsIndex {
        let db_path = std::env::temp_dir().join(format!(
            "newswire-index-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        let pool = connect(&db_path).await.unwrap();
        let store = Arc::new(SqliteArticleStore::new(pool));
        let llm = Arc::new(FakeLlm::new(config.embed_dim));
        NewsIndex::new(store, llm, config)
    }

    #[tokio::test]
    async fn ensure_index_twice_is_a_no_op() {
        let config = AppConfig::for_tests();
        let index = test_index(&config).await;
        index.ensure_index().await.unwrap();
        index.ensure_index().await.unwrap();
        assert_eq!(index.record_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stored_count_matches_article_count() {
        let config = AppConfig::for_tests();
        let index = test_index(&config).await;
        index.ensure_index().await.unwrap();

        let articles = vec![
            article("rockets", "a rocket launch happened today"),
            article("rates", "central bank raised interest rates"),
            article("chess", "world chess championship concluded"),
        ];
        let stored = index.index_articles(&articles).await.unwrap();
        assert_eq!(stored, 3);
        assert_eq!(index.record_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn multi_batch_indexing_covers_every_article() {
        let config = AppConfig {
            embed_batch_size: 4,
            // keep the inter-batch pause negligible for the test
            embed_requests_per_minute: 60_000,
            ..AppConfig::for_tests()
        };
        let index = test_index(&config).await;
        index.ensure_index().await.unwrap();

        let articles: Vec<Article> = (0..10)
            .map(|i| article(&format!("story-{i}"), &format!("body of story number {i}")))
            .collect();
        assert_eq!(index.index_articles(&articles).await.unwrap(), 10);
        assert_eq!(index.record_count().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let config = AppConfig {
            embed_dim: 32,
            ..AppConfig::for_tests()
        };
        // Provider emits 64-dimensional vectors against a 32-dim index.
        let db_path = std::env::temp_dir().join(format!(
            "newswire-index-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        let pool = connect(&db_path).await.unwrap();
        let store = Arc::new(SqliteArticleStore::new(pool));
        let index = NewsIndex::new(store, Arc::new(FakeLlm::new(64)), &config);
        index.ensure_index().await.unwrap();

        let err = index
            .index_articles(&[article("a", "text")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dimension"));
        assert_eq!(index.record_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_returns_closest_articles_first() {
        let config = AppConfig::for_tests();
        let index = test_index(&config).await;
        index.ensure_index().await.unwrap();

        index
            .index_articles(&[
                article("launch", "spacex launched a new rocket into orbit"),
                article("economy", "inflation slowed as markets rallied"),
            ])
            .await
            .unwrap();

        let hits = index.search("rocket orbit launch", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "launch");
        assert!(hits[0].score <= hits[1].score);
    }

    #[tokio::test]
    async fn search_with_empty_index_returns_empty() {
        let config = AppConfig::for_tests();
        let index = test_index(&config).await;
        index.ensure_index().await.unwrap();

        let hits = index.search("anything at all", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn version_change_rebuilds_the_index() {
        let config = AppConfig::for_tests();
        let db_path = std::env::temp_dir().join(format!(
            "newswire-index-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        let pool = connect(&db_path).await.unwrap();
        let store = Arc::new(SqliteArticleStore::new(pool));
        let llm = Arc::new(FakeLlm::new(config.embed_dim));

        let index = NewsIndex::new(store.clone(), llm.clone(), &config);
        index.ensure_index().await.unwrap();
        index
            .index_articles(&[article("old", "stale vectors")])
            .await
            .unwrap();
        assert_eq!(index.record_count().await.unwrap(), 1);

        let switched = AppConfig {
            embed_model: "next-embedder".to_string(),
            ..config
        };
        let rebuilt = NewsIndex::new(store, llm, &switched);
        rebuilt.ensure_index().await.unwrap();
        assert_eq!(rebuilt.record_count().await.unwrap(), 0);
    }
}
