//! Chat session storage.
//!
//! Sessions expire a fixed interval after their last write; the TTL is
//! re-armed on every append. Messages are appended as individual rows inside
//! a transaction, so concurrent writers to the same session interleave
//! instead of overwriting each other.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub last_message: String,
}

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
    ttl: Duration,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl SessionStore {
    pub async fn new(pool: SqlitePool, ttl: Duration) -> Result<Self, ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id)")
            .execute(&pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(Self { pool, ttl })
    }

    pub async fn create_session(&self) -> Result<String, ApiError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let expires_at = now_millis() + self.ttl.as_millis() as i64;

        sqlx::query("INSERT INTO sessions (id, created_at, expires_at) VALUES (?1, ?2, ?3)")
            .bind(&session_id)
            .bind(&now)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(session_id)
    }

    /// Ordered history for a session. Expired and never-created sessions are
    /// indistinguishable: both read as an empty list.
    pub async fn fetch_history(&self, session_id: &str) -> Result<Vec<HistoryEntry>, ApiError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT m.role, m.content
             FROM messages m
             JOIN sessions s ON s.id = m.session_id
             WHERE s.id = ?1 AND s.expires_at > ?2
             ORDER BY m.id ASC",
        )
        .bind(session_id)
        .bind(now_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows
            .into_iter()
            .map(|(role, content)| HistoryEntry { role, content })
            .collect())
    }

    /// Append one message and re-arm the session TTL. Appending to an
    /// expired session drops the stale incarnation first, so the history
    /// starts over instead of resurrecting old messages.
    pub async fn append_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), ApiError> {
        let now = now_millis();
        let created_at = chrono::Utc::now().to_rfc3339();
        let expires_at = now + self.ttl.as_millis() as i64;

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("DELETE FROM sessions WHERE id = ?1 AND expires_at <= ?2")
            .bind(session_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query("INSERT OR IGNORE INTO sessions (id, created_at, expires_at) VALUES (?1, ?2, ?3)")
            .bind(session_id)
            .bind(&created_at)
            .bind(expires_at)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query("UPDATE sessions SET expires_at = ?1 WHERE id = ?2")
            .bind(expires_at)
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    /// Every live session with its most recent message. Expired sessions are
    /// purged on the way.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ApiError> {
        self.purge_expired().await?;

        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT s.id,
                    (SELECT content FROM messages m
                     WHERE m.session_id = s.id
                     ORDER BY m.id DESC LIMIT 1)
             FROM sessions s
             ORDER BY s.created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows
            .into_iter()
            .map(|(session_id, last_message)| SessionSummary {
                session_id,
                last_message: last_message.unwrap_or_default(),
            })
            .collect())
    }

    pub async fn purge_expired(&self) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
            .bind(now_millis())
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected())
    }
}
