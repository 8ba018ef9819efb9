//! In-memory doubles for every collaborator of the dispatch cycle.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsbrief_core::error::{BriefError, Result};
use newsbrief_core::traits::{Generator, NewsSource, Notifier, Summarizer};
use newsbrief_core::types::{
    Article, DeliveryChannel, Message, Notes, OutgoingMessage, SummaryResult,
};

use crate::store::BriefStore;
use crate::tasks::{Subscription, SubscriptionRequest, Task, TaskRun};

pub fn article(title: &str) -> Article {
    Article {
        title: title.into(),
        description: format!("About {title}"),
        url: format!("https://news.example.com/{title}"),
        source: "Example Wire".into(),
        published_at: None,
    }
}

// ─── Content ─────────────────────────────────────────────

pub struct FakeNews {
    articles: Vec<Article>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl FakeNews {
    pub fn with(articles: Vec<Article>) -> Arc<Self> {
        Arc::new(Self {
            articles,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NewsSource for FakeNews {
    async fn search(&self, query: &str, limit: usize) -> Vec<Article> {
        self.calls.lock().unwrap().push((query.to_string(), limit));
        self.articles.iter().take(limit).cloned().collect()
    }
}

pub struct FakeSummarizer {
    answer: Option<String>,
    with_notes: bool,
    calls: Mutex<usize>,
}

impl FakeSummarizer {
    pub fn answering(summary: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(summary.to_string()),
            with_notes: true,
            calls: Mutex::new(0),
        })
    }

    /// Present but empty: no summary text and no notes.
    pub fn blank() -> Arc<Self> {
        Arc::new(Self {
            answer: Some(String::new()),
            with_notes: false,
            calls: Mutex::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            answer: None,
            with_notes: false,
            calls: Mutex::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(
        &self,
        _topic: &str,
        articles: &[Article],
        _provider: &str,
        _model: &str,
    ) -> Option<SummaryResult> {
        *self.calls.lock().unwrap() += 1;
        self.answer.as_ref().map(|summary| SummaryResult {
            summary: summary.clone(),
            notes: if self.with_notes {
                Notes {
                    impact: "Impact note".into(),
                    opportunity: "Opportunity note".into(),
                    risk: "Risk note".into(),
                }
            } else {
                Notes::default()
            },
            articles: articles.to_vec(),
        })
    }
}

pub struct FakeGenerator {
    answer: std::result::Result<String, String>,
    calls: Mutex<Vec<(String, String, Vec<Message>)>>,
}

impl FakeGenerator {
    pub fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(text.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            answer: Err("provider down".into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, String, Vec<Message>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, provider: &str, model: &str, messages: &[Message]) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((provider.to_string(), model.to_string(), messages.to_vec()));
        self.answer.clone().map_err(BriefError::Provider)
    }
}

// ─── Channels ────────────────────────────────────────────

enum SendMode {
    Ok,
    Fail,
    Slow(Duration),
}

pub struct FakeNotifier {
    channel: DeliveryChannel,
    mode: SendMode,
    sent: Mutex<Vec<OutgoingMessage>>,
}

impl FakeNotifier {
    fn build(channel: DeliveryChannel, mode: SendMode) -> Arc<Self> {
        Arc::new(Self {
            channel,
            mode,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn ok(channel: DeliveryChannel) -> Arc<Self> {
        Self::build(channel, SendMode::Ok)
    }

    pub fn failing(channel: DeliveryChannel) -> Arc<Self> {
        Self::build(channel, SendMode::Fail)
    }

    pub fn slow(channel: DeliveryChannel, delay: Duration) -> Arc<Self> {
        Self::build(channel, SendMode::Slow(delay))
    }

    /// Successfully delivered messages.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    fn channel(&self) -> DeliveryChannel {
        self.channel
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<()> {
        match self.mode {
            SendMode::Ok => {}
            SendMode::Fail => return Err(BriefError::Channel(format!("{} down", self.channel))),
            SendMode::Slow(delay) => tokio::time::sleep(delay).await,
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ─── Store ───────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    tasks: Mutex<Vec<Task>>,
    subscriptions: Mutex<Vec<Subscription>>,
    runs: Mutex<Vec<TaskRun>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn with(tasks: Vec<Task>, subscriptions: Vec<Subscription>) -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(tasks),
            subscriptions: Mutex::new(subscriptions),
            ..Self::default()
        })
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.tasks.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }

    pub fn subscription(&self, id: &str) -> Option<Subscription> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn runs(&self) -> Vec<TaskRun> {
        self.runs.lock().unwrap().clone()
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BriefError::Store("read refused".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BriefError::Store("write refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BriefStore for MemoryStore {
    async fn enabled_tasks(&self) -> Result<Vec<Task>> {
        self.check_read()?;
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.enabled)
            .cloned()
            .collect())
    }

    async fn prompt_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.check_read()?;
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| matches!(s.request, SubscriptionRequest::Prompt { .. }))
            .cloned()
            .collect())
    }

    async fn mark_task_run(&self, task_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.check_write()?;
        if let Some(t) = self.tasks.lock().unwrap().iter_mut().find(|t| t.id == task_id) {
            t.last_run = Some(at);
        }
        Ok(())
    }

    async fn mark_subscription_sent(&self, subscription_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.check_write()?;
        if let Some(s) = self
            .subscriptions
            .lock()
            .unwrap()
            .iter_mut()
            .find(|s| s.id == subscription_id)
        {
            s.last_sent = Some(at);
        }
        Ok(())
    }

    async fn append_task_run(&self, run: &TaskRun) -> Result<()> {
        self.check_write()?;
        self.runs.lock().unwrap().push(run.clone());
        Ok(())
    }

    async fn delete_subscription_by_token(&self, token: &str) -> Result<usize> {
        self.check_write()?;
        let mut subs = self.subscriptions.lock().unwrap();
        let before = subs.len();
        subs.retain(|s| s.unsubscribe_token != token);
        Ok(before - subs.len())
    }

    async fn list_tasks(&self, limit: usize) -> Result<Vec<Task>> {
        self.check_read()?;
        let mut tasks = self.tasks.lock().unwrap().clone();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn create_task(&self, task: &Task) -> Result<()> {
        self.check_write()?;
        self.tasks.lock().unwrap().push(task.clone());
        Ok(())
    }

    async fn upsert_filter_subscription(&self, sub: &Subscription) -> Result<Subscription> {
        self.check_write()?;
        let mut subs = self.subscriptions.lock().unwrap();
        if let Some(existing) = subs
            .iter_mut()
            .find(|s| s.email == sub.email && s.topic().is_some() && s.topic() == sub.topic())
        {
            existing.provider = sub.provider.clone();
            existing.model = sub.model.clone();
            existing.cadence = sub.cadence;
            existing.timezone = sub.timezone.clone();
            existing.send_time = sub.send_time.clone();
            return Ok(existing.clone());
        }
        subs.push(sub.clone());
        Ok(sub.clone())
    }

    async fn create_subscription(&self, sub: &Subscription) -> Result<()> {
        self.check_write()?;
        self.subscriptions.lock().unwrap().push(sub.clone());
        Ok(())
    }

    async fn task_runs(&self, task_id: &str) -> Result<Vec<TaskRun>> {
        self.check_read()?;
        let mut runs: Vec<TaskRun> = self
            .runs
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect();
        runs.reverse();
        Ok(runs)
    }
}
