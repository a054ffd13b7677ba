use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};

/// Filesystem locations used by the service.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        let log_dir = data_dir.join("logs");
        let db_path = data_dir.join("newswire.db");

        for dir in [&data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            log_dir,
            db_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("NEWSWIRE_DATA_DIR") {
        return PathBuf::from(dir);
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("data")
}

/// Runtime configuration, resolved once at process start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Gemini API key. The process refuses to start without it.
    pub api_key: String,
    pub chat_model: String,
    pub embed_model: String,
    /// Dimension the article index is created with. Records whose embedding
    /// length differs are rejected at write time.
    pub embed_dim: usize,
    /// Articles per remote embedding request.
    pub embed_batch_size: usize,
    /// Requests-per-minute ceiling for the embedding endpoint.
    pub embed_requests_per_minute: u32,
    pub feeds: Vec<String>,
    pub max_articles_per_feed: usize,
    pub news_ttl: Duration,
    pub session_ttl: Duration,
    /// Articles pulled into the grounding prompt per chat turn.
    pub chat_top_k: usize,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

const DEFAULT_FEEDS: &[&str] = &[
    "https://feeds.bbci.co.uk/news/technology/rss.xml",
    "https://rss.nytimes.com/services/xml/rss/nyt/World.xml",
    "https://rss.nytimes.com/services/xml/rss/nyt/Technology.xml",
    "https://timesofindia.indiatimes.com/rssfeedstopstories.xml",
    "https://feeds.feedburner.com/NDTV-LatestNews.xml",
];

const DEFAULT_ORIGINS: &[&str] = &[
    "http://localhost:8080",
    "http://127.0.0.1:8080",
    "http://localhost:5173",
];

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = match env::var("GEMINI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("Missing GEMINI_API_KEY in environment"),
        };

        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("Invalid PORT value: {raw}"))?,
            Err(_) => 8000,
        };

        let feeds = match env::var("NEWSWIRE_FEEDS") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect(),
        };

        let allowed_origins = match env::var("NEWSWIRE_ALLOWED_ORIGINS") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => DEFAULT_ORIGINS.iter().map(|s| s.to_string()).collect(),
        };

        Ok(AppConfig {
            api_key,
            feeds,
            allowed_origins,
            port,
            ..AppConfig::defaults()
        })
    }

    fn defaults() -> Self {
        AppConfig {
            api_key: String::new(),
            chat_model: "gemini-2.5-flash".to_string(),
            embed_model: "text-embedding-004".to_string(),
            embed_dim: 768,
            embed_batch_size: 16,
            embed_requests_per_minute: 60,
            feeds: DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect(),
            max_articles_per_feed: 12,
            news_ttl: Duration::from_secs(1800),
            session_ttl: Duration::from_secs(3600),
            chat_top_k: 3,
            port: 8000,
            allowed_origins: DEFAULT_ORIGINS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Version tag persisted alongside the article index. Switching the
    /// embedding model or dimension changes the tag, which forces a rebuild
    /// instead of mixing incompatible vectors.
    pub fn index_version_tag(&self) -> String {
        format!("{}:{}", self.embed_model, self.embed_dim)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        AppConfig {
            api_key: "test-key".to_string(),
            embed_dim: 64,
            ..AppConfig::defaults()
        }
    }
}
