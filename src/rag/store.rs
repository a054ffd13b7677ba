//! ArticleStore trait — abstract interface over the shared article/cache
//! storage. The primary implementation is `SqliteArticleStore` in the
//! `sqlite` module.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// A news article as produced by feed ingestion. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub text: String,
    pub url: String,
}

/// An article paired with its embedding, ready to be indexed.
#[derive(Debug, Clone)]
pub struct ArticleRecord {
    pub article: Article,
    pub embedding: Vec<f32>,
}

/// One retrieval result. `score` is the cosine distance to the query
/// (lower = more similar); hits are ordered by ascending score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub text: String,
    pub url: String,
    pub score: f32,
}

/// Storage backend for indexed articles, the raw news cache, and the index
/// version tag. All state lives in one shared database so a process restart
/// loses nothing.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Create the schema if absent. Idempotent: calling it again against an
    /// existing schema must not error.
    async fn ensure_schema(&self) -> Result<(), ApiError>;

    /// The persisted embedding-model version tag, if any.
    async fn index_version(&self) -> Result<Option<String>, ApiError>;

    async fn set_index_version(&self, tag: &str) -> Result<(), ApiError>;

    /// Store a batch of records keyed by their position in the batch.
    /// Repeated runs overwrite records at the same offsets rather than
    /// duplicating them.
    async fn store_records(&self, records: Vec<ArticleRecord>) -> Result<(), ApiError>;

    /// Drop every indexed record, keeping the schema.
    async fn clear_records(&self) -> Result<usize, ApiError>;

    async fn record_count(&self) -> Result<usize, ApiError>;

    /// k-nearest-neighbor scan by cosine distance. An empty index yields an
    /// empty result, never an error.
    async fn knn(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, ApiError>;

    /// The most recent fetch, unless its TTL elapsed.
    async fn cached_news(&self) -> Result<Option<Vec<Article>>, ApiError>;

    /// Overwrite the news cache, arming the given TTL.
    async fn cache_news(&self, articles: &[Article], ttl: Duration) -> Result<(), ApiError>;
}
