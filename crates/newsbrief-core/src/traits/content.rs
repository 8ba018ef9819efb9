//! Content fetch and summarization traits.

use async_trait::async_trait;

use crate::types::{Article, SummaryResult};

/// Searches recent articles for a query.
///
/// Implementations never fail: no results and transport errors both yield
/// an empty list.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Vec<Article>;
}

/// Turns a set of articles into a structured brief.
///
/// Returns `None` only when no model call succeeded. Unparsable model output
/// still yields `Some` with whatever could be extracted.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        topic: &str,
        articles: &[Article],
        provider: &str,
        model: &str,
    ) -> Option<SummaryResult>;
}
