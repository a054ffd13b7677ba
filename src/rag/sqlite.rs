//! SQLite-backed article store.
//!
//! Articles and their embedding BLOBs live in one table scanned with
//! brute-force cosine similarity; the news cache and the index version tag
//! share the same database file.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{Article, ArticleRecord, ArticleStore, SearchHit};
use crate::core::errors::ApiError;

/// Open (or create) the shared database. Session storage uses the same pool.
pub async fn connect(db_path: &Path) -> Result<SqlitePool, ApiError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(4)
        .connect_with(options)
        .await
        .map_err(ApiError::internal)
}

pub struct SqliteArticleStore {
    pool: SqlitePool,
}

impl SqliteArticleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl ArticleStore for SqliteArticleStore {
    async fn ensure_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS articles (
                batch_offset INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                text TEXT NOT NULL,
                url TEXT NOT NULL,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS news_cache (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                payload TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    async fn index_version(&self) -> Result<Option<String>, ApiError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'embedding_model'")
                .fetch_optional(&self.pool)
                .await
                .map_err(ApiError::internal)?;
        Ok(value)
    }

    async fn set_index_version(&self, tag: &str) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT OR REPLACE INTO index_meta (key, value, updated_at)
             VALUES ('embedding_model', ?1, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(tag)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    async fn store_records(&self, records: Vec<ArticleRecord>) -> Result<(), ApiError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for (offset, record) in records.iter().enumerate() {
            let blob = Self::serialize_embedding(&record.embedding);
            sqlx::query(
                "INSERT OR REPLACE INTO articles (batch_offset, title, text, url, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(offset as i64)
            .bind(&record.article.title)
            .bind(&record.article.text)
            .bind(&record.article.url)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn clear_records(&self) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM articles")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected() as usize)
    }

    async fn record_count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count as usize)
    }

    async fn knn(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, ApiError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT title, text, url, embedding FROM articles")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let mut scored: Vec<SearchHit> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let stored = Self::deserialize_embedding(&embedding_bytes);
                // Records written against another schema dimension are
                // unsearchable, not an error.
                if stored.len() != query.len() {
                    return None;
                }
                let distance = 1.0 - Self::cosine_similarity(query, &stored);
                Some(SearchHit {
                    title: row.get("title"),
                    text: row.get("text"),
                    url: row.get("url"),
                    score: distance,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn cached_news(&self) -> Result<Option<Vec<Article>>, ApiError> {
        let payload: Option<String> = sqlx::query_scalar(
            "SELECT payload FROM news_cache WHERE id = 1 AND expires_at > ?1",
        )
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        match payload {
            Some(raw) => {
                let articles = serde_json::from_str(&raw).map_err(ApiError::internal)?;
                Ok(Some(articles))
            }
            None => Ok(None),
        }
    }

    async fn cache_news(&self, articles: &[Article], ttl: Duration) -> Result<(), ApiError> {
        let payload = serde_json::to_string(articles).map_err(ApiError::internal)?;
        let expires_at = now_millis() + ttl.as_millis() as i64;

        sqlx::query("INSERT OR REPLACE INTO news_cache (id, payload, expires_at) VALUES (1, ?1, ?2)")
            .bind(&payload)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }
}
