//! RSS feed ingestion: fetch feed entries, download and extract article
//! bodies concurrently, cache the surviving set.

pub mod extract;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use reqwest::Client;

use crate::core::config::AppConfig;
use crate::core::errors::ApiError;
use crate::rag::store::{Article, ArticleStore};

#[derive(Clone)]
pub struct FeedIngestor {
    http: Client,
    store: Arc<dyn ArticleStore>,
    feeds: Vec<String>,
    max_per_feed: usize,
    news_ttl: Duration,
}

impl FeedIngestor {
    pub fn new(store: Arc<dyn ArticleStore>, config: &AppConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("newswire-backend/0.3")
            .build()
            .unwrap_or_default();

        Self {
            http,
            store,
            feeds: config.feeds.clone(),
            max_per_feed: config.max_articles_per_feed,
            news_ttl: config.news_ttl,
        }
    }

    /// Fetch the configured feeds and return the parsed articles.
    ///
    /// A fresh cached set short-circuits the whole fetch. Individual article
    /// failures are logged and dropped; only storage errors are fatal to the
    /// batch.
    pub async fn fetch_news(&self) -> Result<Vec<Article>, ApiError> {
        if let Some(cached) = self.store.cached_news().await? {
            tracing::info!("Returning {} cached articles", cached.len());
            return Ok(cached);
        }

        let mut tasks = Vec::new();
        for feed_url in &self.feeds {
            match self.feed_entry_links(feed_url).await {
                Ok(links) => {
                    for link in links {
                        tasks.push(tokio::spawn(fetch_article(self.http.clone(), link)));
                    }
                }
                Err(err) => {
                    tracing::warn!("Failed to read feed {}: {}", feed_url, err);
                }
            }
        }

        let results = join_all(tasks).await;
        let articles: Vec<Article> = results
            .into_iter()
            .filter_map(|joined| joined.ok().flatten())
            .collect();

        if !articles.is_empty() {
            self.store.cache_news(&articles, self.news_ttl).await?;
            tracing::info!("Fetched and cached {} articles", articles.len());
        }

        Ok(articles)
    }

    async fn feed_entry_links(&self, feed_url: &str) -> Result<Vec<String>, ApiError> {
        let bytes = self
            .http
            .get(feed_url)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(ApiError::internal)?
            .bytes()
            .await
            .map_err(ApiError::internal)?;

        let feed = feed_rs::parser::parse(&bytes[..]).map_err(ApiError::internal)?;

        Ok(feed
            .entries
            .into_iter()
            .take(self.max_per_feed)
            .filter_map(|entry| entry.links.into_iter().next().map(|link| link.href))
            .collect())
    }
}

/// Download and extract one article. Never fails the batch: any error is
/// logged and the article is dropped.
async fn fetch_article(client: Client, url: String) -> Option<Article> {
    match download_and_extract(&client, &url).await {
        Ok(Some(article)) => Some(article),
        Ok(None) => {
            tracing::warn!("Skipping {}: no usable title or body", url);
            None
        }
        Err(err) => {
            tracing::warn!("Failed to fetch {}: {}", url, err);
            None
        }
    }
}

async fn download_and_extract(client: &Client, url: &str) -> Result<Option<Article>, ApiError> {
    let html = client
        .get(url)
        .send()
        .await
        .and_then(|res| res.error_for_status())
        .map_err(ApiError::internal)?
        .text()
        .await
        .map_err(ApiError::internal)?;

    // DOM parsing is CPU-bound; keep it off the event loop.
    let extracted = tokio::task::spawn_blocking(move || extract::extract_article(&html))
        .await
        .map_err(ApiError::internal)?;

    Ok(extracted.map(|e| Article {
        title: e.title,
        text: e.text,
        url: url.to_string(),
    }))
}
