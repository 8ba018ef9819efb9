//! Group processing: one fetch + summarize per group, with a direct generation
//! fallback when there is nothing to summarize.

use std::sync::Arc;
use std::time::Duration;

use newsbrief_core::error::BriefError;
use newsbrief_core::traits::{Generator, NewsSource, Summarizer};
use newsbrief_core::types::{Message, Notes, SummaryResult};
use serde::Serialize;
use tokio::time::timeout;

use crate::jobs::GroupKey;

/// System prompt for the direct generation fallback.
pub const FALLBACK_SYSTEM_PROMPT: &str =
    "You are an assistant that returns concise output for scheduled user tasks.";

/// How a group's content was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentPath {
    Summarized,
    Generated,
}

/// Result of processing one group.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOutcome {
    Ready {
        result: SummaryResult,
        path: ContentPath,
    },
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ProcessSettings {
    pub short_request_words: usize,
    pub article_page_size: usize,
    pub fetch_timeout: Duration,
    pub generate_timeout: Duration,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            short_request_words: 8,
            article_page_size: 5,
            fetch_timeout: Duration::from_secs(15),
            generate_timeout: Duration::from_secs(60),
        }
    }
}

/// Short requests look like search queries; long ones are instructions.
/// Blank text is never short.
pub fn is_short_request(text: &str, max_words: usize) -> bool {
    let words = text.split_whitespace().count();
    words > 0 && words <= max_words
}

pub struct GroupProcessor {
    news: Arc<dyn NewsSource>,
    summarizer: Arc<dyn Summarizer>,
    generator: Arc<dyn Generator>,
    settings: ProcessSettings,
}

impl GroupProcessor {
    pub fn new(
        news: Arc<dyn NewsSource>,
        summarizer: Arc<dyn Summarizer>,
        generator: Arc<dyn Generator>,
        settings: ProcessSettings,
    ) -> Self {
        Self {
            news,
            summarizer,
            generator,
            settings,
        }
    }

    pub async fn process(&self, key: &GroupKey) -> GroupOutcome {
        let mut articles = Vec::new();

        if is_short_request(&key.request, self.settings.short_request_words) {
            match timeout(
                self.settings.fetch_timeout,
                self.news.search(&key.request, self.settings.article_page_size),
            )
            .await
            {
                Ok(found) => articles = found,
                Err(_) => tracing::warn!(
                    "⏱️ News fetch for '{}' timed out after {:?}",
                    key.request,
                    self.settings.fetch_timeout
                ),
            }

            if !articles.is_empty() {
                let summary = timeout(
                    self.settings.generate_timeout,
                    self.summarizer
                        .summarize(&key.request, &articles, &key.provider, &key.model),
                )
                .await;
                match summary {
                    Ok(Some(result)) if result.summary.trim().is_empty() && result.notes.is_empty() => {
                        tracing::warn!(
                            "⚠️ Summarizer returned a blank brief for '{}', falling back to generation",
                            key.request
                        )
                    }
                    Ok(Some(mut result)) => {
                        if result.articles.is_empty() {
                            result.articles = articles;
                        }
                        return GroupOutcome::Ready {
                            result,
                            path: ContentPath::Summarized,
                        };
                    }
                    Ok(None) => tracing::warn!(
                        "⚠️ Summarizer produced nothing for '{}', falling back to generation",
                        key.request
                    ),
                    Err(_) => tracing::warn!(
                        "⏱️ Summarizer for '{}' timed out, falling back to generation",
                        key.request
                    ),
                }
            }
        }

        let messages = [
            Message::system(FALLBACK_SYSTEM_PROMPT),
            Message::user(key.request.clone()),
        ];
        let generated = timeout(
            self.settings.generate_timeout,
            self.generator.generate(&key.provider, &key.model, &messages),
        )
        .await;

        match generated {
            Ok(Ok(text)) if !text.trim().is_empty() => GroupOutcome::Ready {
                result: SummaryResult {
                    summary: text.trim().to_string(),
                    notes: Notes::default(),
                    articles,
                },
                path: ContentPath::Generated,
            },
            Ok(Ok(_)) => GroupOutcome::Failed(format!(
                "{}/{} returned an empty completion",
                key.provider, key.model
            )),
            Ok(Err(e)) => GroupOutcome::Failed(e.to_string()),
            Err(_) => GroupOutcome::Failed(
                BriefError::Timeout(self.settings.generate_timeout.as_secs(), "generation".into())
                    .to_string(),
            ),
        }
    }
}
