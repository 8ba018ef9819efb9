//! Task and subscription definitions, the core data model for scheduled briefs.

use chrono::{DateTime, Utc};
use newsbrief_core::types::DeliveryChannel;
use serde::{Deserialize, Serialize};

/// Longest result / error text kept in a run log entry.
pub const RUN_LOG_LIMIT: usize = 4000;

/// A cron-scheduled brief owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID.
    pub id: String,
    /// Owner contact (email or "anonymous").
    pub owner: String,
    /// Human-readable name, used in subjects.
    pub name: String,
    /// Request sent to the content pipeline.
    pub prompt: String,
    pub provider: String,
    pub model: String,
    /// Cron expression, evaluated in `timezone`.
    pub cron: String,
    /// IANA timezone name.
    pub timezone: String,
    /// Requested delivery channels.
    pub channels: Vec<DeliveryChannel>,
    pub to_email: Option<String>,
    pub to_whatsapp: Option<String>,
    pub enabled: bool,
    /// Last fired occurrence.
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create an enabled task with a fresh id, owned by `owner`.
    pub fn new(owner: &str, name: &str, prompt: &str, cron: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            prompt: prompt.to_string(),
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            cron: cron.to_string(),
            timezone: "UTC".to_string(),
            channels: vec![DeliveryChannel::Email],
            to_email: None,
            to_whatsapp: None,
            enabled: true,
            last_run: None,
            created_at: Utc::now(),
        }
    }
}

/// What a subscription asks for. Exactly one of topic / prompt exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SubscriptionRequest {
    /// Keyword filter; one row per topic.
    Filter { topic: String },
    /// Free-form request.
    Prompt { prompt: String },
}

impl SubscriptionRequest {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Filter { .. } => "filter",
            Self::Prompt { .. } => "prompt",
        }
    }
}

/// Subscription send frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Hourly,
    Daily,
}

impl Cadence {
    /// Anything but "hourly" means daily.
    pub fn from_freq(freq: &str) -> Self {
        if freq.trim().eq_ignore_ascii_case("hourly") {
            Self::Hourly
        } else {
            Self::Daily
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        }
    }
}

/// An email subscription with a cadence rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub email: String,
    #[serde(flatten)]
    pub request: SubscriptionRequest,
    pub provider: String,
    pub model: String,
    #[serde(rename = "freq")]
    pub cadence: Cadence,
    /// Stored for display; the cadence rule works in UTC.
    pub timezone: String,
    pub send_time: Option<String>,
    pub last_sent: Option<DateTime<Utc>>,
    pub unsubscribe_token: String,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Create a daily subscription with a fresh id and unsubscribe token.
    pub fn new(email: &str, request: SubscriptionRequest) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            request,
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            cadence: Cadence::Daily,
            timezone: "UTC".to_string(),
            send_time: None,
            last_sent: None,
            unsubscribe_token: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }

    /// Topic used as the display name, if this is a filter subscription.
    pub fn topic(&self) -> Option<&str> {
        match &self.request {
            SubscriptionRequest::Filter { topic } => Some(topic),
            SubscriptionRequest::Prompt { .. } => None,
        }
    }
}

/// Outcome status of one task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Partial,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Partial => "partial",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "ok" => Self::Ok,
            "partial" => Self::Partial,
            _ => Self::Error,
        }
    }
}

/// One row of a task's run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub task_id: String,
    pub status: RunStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskRun {
    /// Build a log entry, truncating result and error to `RUN_LOG_LIMIT` chars.
    pub fn new(
        task_id: &str,
        status: RunStatus,
        result: Option<&str>,
        error: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.to_string(),
            status,
            result: result.map(|r| truncate_chars(r, RUN_LOG_LIMIT)),
            error: error.map(|e| truncate_chars(e, RUN_LOG_LIMIT)),
            created_at,
        }
    }
}

/// Keep at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
