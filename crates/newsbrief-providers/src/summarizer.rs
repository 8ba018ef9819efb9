//! Article summarizer: executive summary plus Impact / Opportunity / Risk notes.
//!
//! The model is asked for a fixed sectioned layout; parsing is lenient so that
//! a rambling or empty answer still produces a (possibly empty) result.

use std::sync::Arc;

use async_trait::async_trait;
use newsbrief_core::traits::{Generator, Summarizer};
use newsbrief_core::types::{Article, Message, Notes, SummaryResult};

/// Summarizer backed by any `Generator`.
pub struct AiSummarizer {
    generator: Arc<dyn Generator>,
    /// Provider retried once when the requested provider fails.
    fallback_provider: String,
    fallback_model: String,
}

impl AiSummarizer {
    pub fn new(
        generator: Arc<dyn Generator>,
        fallback_provider: impl Into<String>,
        fallback_model: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            fallback_provider: fallback_provider.into(),
            fallback_model: fallback_model.into(),
        }
    }
}

/// Build the system + user prompt for a set of articles.
pub fn build_messages(topic: &str, articles: &[Article]) -> Vec<Message> {
    let article_list = articles
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}. ({}) {}\n{}", i + 1, a.source, a.title, a.description))
        .collect::<Vec<_>>()
        .join("\n\n");

    let system = format!(
        "You are an expert news summarizer. Produce a concise executive summary of the provided \
         recent articles about \"{topic}\" (150-220 words). Then provide three short bullet points \
         labeled Impact, Opportunity, Risk. Use clear, non-technical language."
    );

    let user = format!(
        "Here are the recent articles:\n\n{article_list}\n\nOutput format exactly like this:\n\n\
         SUMMARY:\n<one-paragraph summary 150-220 words>\n\n\
         IMPACT:\n- <one short sentence>\n\n\
         OPPORTUNITY:\n- <one short sentence>\n\n\
         RISK:\n- <one short sentence>\n"
    );

    vec![Message::system(system), Message::user(user)]
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Summary,
    Impact,
    Opportunity,
    Risk,
}

/// Match a section header such as `IMPACT:`, `**Risk -**` or `## Opportunity:`.
/// Returns the section and any text following the header on the same line.
fn section_header(line: &str) -> Option<(Section, &str)> {
    let stripped = line.trim_start_matches(['*', '#', ' ']);
    for (label, section) in [
        ("SUMMARY", Section::Summary),
        ("IMPACT", Section::Impact),
        ("OPPORTUNITY", Section::Opportunity),
        ("RISK", Section::Risk),
    ] {
        let Some(head) = stripped.get(..label.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(label) {
            continue;
        }
        let rest = stripped[label.len()..].trim_start_matches('*').trim_start();
        if let Some(after) = rest.strip_prefix([':', '-']) {
            return Some((section, after.trim_start_matches('*').trim()));
        }
    }
    None
}

/// Parse sectioned model output. Never fails; unknown layouts end up in the
/// summary text.
pub fn parse_output(raw: &str) -> SummaryResult {
    let mut section = Section::Summary;
    let mut summary_parts: Vec<&str> = Vec::new();
    let mut impact: Vec<&str> = Vec::new();
    let mut opportunity: Vec<&str> = Vec::new();
    let mut risk: Vec<&str> = Vec::new();

    for line in raw.lines().map(str::trim) {
        let text = match section_header(line) {
            Some((s, rest)) => {
                section = s;
                rest
            }
            None => line,
        };
        if text.is_empty() {
            continue;
        }
        let bullet = text.trim_start_matches(['-', '•', '*']).trim();
        match section {
            Section::Summary => summary_parts.push(text),
            Section::Impact => impact.push(bullet),
            Section::Opportunity => opportunity.push(bullet),
            Section::Risk => risk.push(bullet),
        }
    }

    SummaryResult {
        summary: summary_parts.join(" ").trim().to_string(),
        notes: Notes {
            impact: impact.join(" ").trim().to_string(),
            opportunity: opportunity.join(" ").trim().to_string(),
            risk: risk.join(" ").trim().to_string(),
        },
        articles: Vec::new(),
    }
}

#[async_trait]
impl Summarizer for AiSummarizer {
    async fn summarize(
        &self,
        topic: &str,
        articles: &[Article],
        provider: &str,
        model: &str,
    ) -> Option<SummaryResult> {
        if articles.is_empty() {
            return None;
        }
        let messages = build_messages(topic, articles);

        let raw = match self.generator.generate(provider, model, &messages).await {
            Ok(text) => text,
            Err(e) if provider != self.fallback_provider => {
                tracing::warn!("⚠️ Summarizer: {provider} failed ({e}), retrying with {}", self.fallback_provider);
                match self
                    .generator
                    .generate(&self.fallback_provider, &self.fallback_model, &messages)
                    .await
                {
                    Ok(text) => text,
                    Err(e2) => {
                        tracing::error!("❌ Summarizer fallback failed: {e2}");
                        return None;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("⚠️ Summarizer: {provider} failed: {e}");
                return None;
            }
        };

        let mut result = parse_output(&raw);
        if result.summary.is_empty() {
            tracing::debug!("Summarizer output had no summary section ({} chars)", raw.len());
        }
        result.articles = articles.to_vec();
        Some(result)
    }
}
