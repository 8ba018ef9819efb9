//! News search via the NewsAPI.org `everything` endpoint.
//!
//! Failures never reach the caller: a missing key, a transport error, a
//! non-2xx status, or an unexpected body all yield an empty article list.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsbrief_core::config::NewsConfig;
use newsbrief_core::error::BriefError;
use newsbrief_core::traits::NewsSource;
use newsbrief_core::types::Article;
use serde::Deserialize;

pub struct NewsApiClient {
    config: NewsConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    #[serde(default)]
    source: Option<RawSource>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    #[serde(default)]
    name: Option<String>,
}

impl NewsApiClient {
    pub fn new(config: NewsConfig) -> newsbrief_core::error::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("NewsBrief/1.0")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BriefError::Http(format!("HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<Article>, String> {
        let page_size = limit.to_string();
        let resp = self
            .client
            .get(&self.config.endpoint)
            .header("X-Api-Key", &self.config.api_key)
            .query(&[
                ("q", query),
                ("pageSize", page_size.as_str()),
                ("sortBy", self.config.sort_by.as_str()),
                ("language", self.config.language.as_str()),
            ])
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("NewsAPI error {status}: {body}"));
        }

        let text = resp.text().await.map_err(|e| format!("read failed: {e}"))?;
        parse_articles(&text, limit)
    }
}

/// Convert a NewsAPI response body into articles, skipping entries without a
/// title or URL.
fn parse_articles(body: &str, limit: usize) -> Result<Vec<Article>, String> {
    let parsed: EverythingResponse =
        serde_json::from_str(body).map_err(|e| format!("invalid response: {e}"))?;

    Ok(parsed
        .articles
        .into_iter()
        .filter_map(|a| {
            let title = a.title.filter(|t| !t.trim().is_empty())?;
            let url = a.url.filter(|u| !u.trim().is_empty())?;
            Some(Article {
                title,
                description: a
                    .description
                    .filter(|d| !d.is_empty())
                    .or(a.content)
                    .unwrap_or_default(),
                url,
                source: a.source.and_then(|s| s.name).unwrap_or_default(),
                published_at: a
                    .published_at
                    .and_then(|p| DateTime::parse_from_rfc3339(&p).ok())
                    .map(|d| d.with_timezone(&Utc)),
            })
        })
        .take(limit)
        .collect())
}

#[async_trait]
impl NewsSource for NewsApiClient {
    async fn search(&self, query: &str, limit: usize) -> Vec<Article> {
        if self.config.api_key.is_empty() {
            tracing::warn!("⚠️ NEWSAPI key not configured — skipping search for '{query}'");
            return Vec::new();
        }
        if query.trim().is_empty() || limit == 0 {
            return Vec::new();
        }

        match self.fetch(query, limit).await {
            Ok(articles) => {
                tracing::info!("📰 News search '{}': {} article(s)", query, articles.len());
                articles
            }
            Err(e) => {
                tracing::error!("❌ News search '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }
}
