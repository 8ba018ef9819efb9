//! Brief rendering: newsletter HTML, its plain-text twin, and the short
//! messaging body.

use newsbrief_core::types::{DeliveryChannel, OutgoingMessage, SummaryResult};

use crate::tasks::truncate_chars;

/// Longest summary excerpt sent over messaging channels.
pub const MESSAGING_SUMMARY_LIMIT: usize = 2000;

/// Rendered content for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBrief {
    pub subject: String,
    pub html: String,
    pub text: String,
    pub messaging: String,
}

impl RenderedBrief {
    /// Message for `channel` addressed to `to`.
    pub fn message_for(&self, channel: DeliveryChannel, to: &str) -> OutgoingMessage {
        match channel {
            DeliveryChannel::Email => OutgoingMessage {
                to: to.to_string(),
                subject: self.subject.clone(),
                html: self.html.clone(),
                text: self.text.clone(),
            },
            DeliveryChannel::Whatsapp => OutgoingMessage {
                to: to.to_string(),
                subject: self.subject.clone(),
                html: String::new(),
                text: self.messaging.clone(),
            },
        }
    }
}

pub fn unsubscribe_url(site_url: &str, token: &str) -> String {
    format!(
        "{}/api/unsubscribe?token={}",
        site_url.trim_end_matches('/'),
        urlencoding::encode(token)
    )
}

pub fn subject(name: &str) -> String {
    format!("{name} — automated")
}

/// Render every representation of a brief.
pub fn render(
    name: &str,
    result: &SummaryResult,
    unsubscribe_token: Option<&str>,
    site_url: &str,
) -> RenderedBrief {
    let unsubscribe = unsubscribe_token.map(|t| unsubscribe_url(site_url, t));
    let unsubscribe = unsubscribe.as_deref();
    RenderedBrief {
        subject: subject(name),
        html: newsletter_html(name, result, unsubscribe),
        text: newsletter_text(name, result, unsubscribe),
        messaging: messaging_text(name, &result.summary, unsubscribe),
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn newsletter_html(title: &str, result: &SummaryResult, unsubscribe: Option<&str>) -> String {
    let mut html = String::from(
        "<div style=\"font-family:system-ui,Arial,Helvetica,sans-serif; line-height:1.4; color:#111;\">\n",
    );
    html.push_str(&format!("<h2>{}</h2>\n", escape_html(title)));
    html.push_str(&format!("<p>{}</p>\n", escape_html(&result.summary)));

    html.push_str("<h3>Key notes</h3>\n<ul>\n");
    for (label, value) in [
        ("Impact", &result.notes.impact),
        ("Opportunity", &result.notes.opportunity),
        ("Risk", &result.notes.risk),
    ] {
        html.push_str(&format!(
            "<li><strong>{label}:</strong> {}</li>\n",
            escape_html(value)
        ));
    }
    html.push_str("</ul>\n");

    if !result.articles.is_empty() {
        html.push_str("<h4>Sources</h4>\n<ul>\n");
        for a in &result.articles {
            html.push_str(&format!(
                "<li><a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a> — <small>{}</small></li>\n",
                escape_html(&a.url),
                escape_html(&a.title),
                escape_html(&a.source)
            ));
        }
        html.push_str("</ul>\n");
    }

    if let Some(url) = unsubscribe {
        html.push_str(&format!(
            "<hr />\n<p style=\"font-size:12px; color:#666;\">To unsubscribe, click <a href=\"{}\">here</a>.</p>\n",
            escape_html(url)
        ));
    }
    html.push_str("</div>\n");
    html
}

/// Plain-text alternative for email clients without HTML.
pub fn newsletter_text(title: &str, result: &SummaryResult, unsubscribe: Option<&str>) -> String {
    let mut text = format!("{title}\n\n{}\n", result.summary);
    if !result.notes.is_empty() {
        text.push_str(&format!(
            "\nKey notes\n- Impact: {}\n- Opportunity: {}\n- Risk: {}\n",
            result.notes.impact, result.notes.opportunity, result.notes.risk
        ));
    }
    if !result.articles.is_empty() {
        text.push_str("\nSources\n");
        for a in &result.articles {
            text.push_str(&format!("- {} ({}) {}\n", a.title, a.source, a.url));
        }
    }
    if let Some(url) = unsubscribe {
        text.push_str(&format!("\nUnsubscribe: {url}\n"));
    }
    text
}

pub fn messaging_text(name: &str, summary: &str, unsubscribe: Option<&str>) -> String {
    let mut text = format!("{name}\n\n{}", truncate_chars(summary, MESSAGING_SUMMARY_LIMIT));
    if let Some(url) = unsubscribe {
        text.push_str(&format!("\n\nUnsubscribe: {url}"));
    }
    text
}
