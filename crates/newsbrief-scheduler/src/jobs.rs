//! Job assembly and grouping.
//!
//! A `Job` is one pending delivery derived from a due task or subscription.
//! Jobs asking for the same (request, provider, model) share a `Group`, so the
//! expensive fetch + summarize runs once per group.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use newsbrief_core::types::DeliveryChannel;
use serde::Serialize;

use crate::due::{is_subscription_due, is_task_due};
use crate::tasks::{Subscription, SubscriptionRequest, Task};

/// Where a job came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobSource {
    Task,
    Subscription,
}

/// One pending delivery. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub source: JobSource,
    pub source_id: String,
    pub name: String,
    pub request: String,
    pub provider: String,
    pub model: String,
    pub channels: Vec<DeliveryChannel>,
    pub to_email: Option<String>,
    pub to_whatsapp: Option<String>,
    pub unsubscribe_token: Option<String>,
}

/// Provider / model used when a record leaves them blank.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDefaults {
    pub provider: String,
    pub model: String,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4".into(),
        }
    }
}

fn or_default(value: &str, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

impl Job {
    pub fn from_task(task: &Task, defaults: &JobDefaults) -> Self {
        Self {
            source: JobSource::Task,
            source_id: task.id.clone(),
            name: or_default(&task.name, "task"),
            request: task.prompt.clone(),
            provider: or_default(&task.provider, &defaults.provider),
            model: or_default(&task.model, &defaults.model),
            channels: task.channels.clone(),
            to_email: task.to_email.clone(),
            to_whatsapp: task.to_whatsapp.clone(),
            unsubscribe_token: None,
        }
    }

    /// Prompt-mode subscriptions only; filter subscriptions yield `None`.
    pub fn from_subscription(sub: &Subscription, defaults: &JobDefaults) -> Option<Self> {
        let SubscriptionRequest::Prompt { prompt } = &sub.request else {
            return None;
        };
        Some(Self {
            source: JobSource::Subscription,
            source_id: sub.id.clone(),
            name: sub.topic().unwrap_or("subscription").to_string(),
            request: prompt.clone(),
            provider: or_default(&sub.provider, &defaults.provider),
            model: or_default(&sub.model, &defaults.model),
            channels: vec![DeliveryChannel::Email],
            to_email: Some(sub.email.clone()),
            to_whatsapp: None,
            unsubscribe_token: Some(sub.unsubscribe_token.clone()),
        })
    }

    /// Non-blank destination for `channel`.
    pub fn destination(&self, channel: DeliveryChannel) -> Option<&str> {
        let dest = match channel {
            DeliveryChannel::Email => self.to_email.as_deref(),
            DeliveryChannel::Whatsapp => self.to_whatsapp.as_deref(),
        };
        dest.filter(|d| !d.trim().is_empty())
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            request: self.request.clone(),
            provider: self.provider.clone(),
            model: self.model.clone(),
        }
    }
}

/// Exact (request, provider, model) triple. No normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GroupKey {
    pub request: String,
    pub provider: String,
    pub model: String,
}

/// Jobs sharing one content operation, in assembly order.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: GroupKey,
    pub jobs: Vec<Job>,
}

/// A task skipped because its schedule could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedTask {
    pub task_id: String,
    pub error: String,
}

/// Due jobs plus the tasks that could not be evaluated.
#[derive(Debug, Default)]
pub struct Assembly {
    pub jobs: Vec<Job>,
    pub skipped: Vec<SkippedTask>,
}

/// Turn due tasks and subscriptions into jobs. Tasks first, then subscriptions,
/// each in input order.
pub fn assemble(
    tasks: &[Task],
    subscriptions: &[Subscription],
    now: DateTime<Utc>,
    defaults: &JobDefaults,
) -> Assembly {
    let mut assembly = Assembly::default();

    for task in tasks {
        match is_task_due(task, now) {
            Ok(true) => assembly.jobs.push(Job::from_task(task, defaults)),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("⚠️ Skipping task '{}' ({}): {}", task.name, task.id, e);
                assembly.skipped.push(SkippedTask {
                    task_id: task.id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    assembly.jobs.extend(
        subscriptions
            .iter()
            .filter(|s| is_subscription_due(s, now))
            .filter_map(|s| Job::from_subscription(s, defaults)),
    );

    assembly
}

/// Partition jobs by their group key, groups in first-seen order.
pub fn group_jobs(jobs: Vec<Job>) -> Vec<Group> {
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for job in jobs {
        let key = job.group_key();
        match index.get(&key) {
            Some(&i) => groups[i].jobs.push(job),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(Group {
                    key,
                    jobs: vec![job],
                });
            }
        }
    }

    groups
}
