//! One dispatch cycle, end to end: load → due check → group → process →
//! dispatch → record.
//!
//! A cycle never fails. Every per-unit problem (bad cron, failed group, failed
//! channel, failed store write) is logged and folded into the `CycleReport`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::future::join_all;
use futures::stream;
use newsbrief_core::config::BriefConfig;
use newsbrief_core::error::{BriefError, Result};
use newsbrief_core::traits::{Generator, NewsSource, Notifier, Summarizer};
use newsbrief_core::types::SummaryResult;
use serde::Serialize;
use tokio::time::timeout;

use crate::dispatch::{ChannelOutcome, Dispatcher, JobOutcome};
use crate::jobs::{Group, GroupKey, Job, JobDefaults, JobSource, SkippedTask, assemble, group_jobs};
use crate::process::{ContentPath, GroupOutcome, GroupProcessor, ProcessSettings};
use crate::recorder::RunStateRecorder;
use crate::store::BriefStore;

/// Tunables for a cycle.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub process: ProcessSettings,
    pub max_concurrent_groups: usize,
    pub site_url: String,
    pub send_timeout: Duration,
    pub store_timeout: Duration,
    pub defaults: JobDefaults,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            process: ProcessSettings::default(),
            max_concurrent_groups: 4,
            site_url: "http://localhost:3000".into(),
            send_timeout: Duration::from_secs(20),
            store_timeout: Duration::from_secs(5),
            defaults: JobDefaults::default(),
        }
    }
}

impl CycleSettings {
    pub fn from_config(config: &BriefConfig) -> Self {
        let s = &config.scheduler;
        Self {
            process: ProcessSettings {
                short_request_words: s.short_request_words,
                article_page_size: s.article_page_size,
                fetch_timeout: Duration::from_secs(s.fetch_timeout_secs),
                generate_timeout: Duration::from_secs(s.generate_timeout_secs),
            },
            max_concurrent_groups: s.max_concurrent_groups.max(1),
            site_url: s.site_url.clone(),
            send_timeout: Duration::from_secs(s.send_timeout_secs),
            store_timeout: Duration::from_secs(s.store_timeout_secs),
            defaults: JobDefaults {
                provider: config.llm.default_provider.clone(),
                model: config.llm.default_model.clone(),
            },
        }
    }
}

/// Per-job line of the report.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub source: JobSource,
    pub id: String,
    pub name: String,
    pub outcome: JobOutcome,
    pub channels: Vec<ChannelOutcome>,
}

/// Per-group line of the report.
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    #[serde(flatten)]
    pub key: GroupKey,
    pub jobs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<ContentPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    /// Jobs with at least one successful delivery.
    pub sent: usize,
    pub due: usize,
    pub failed_groups: usize,
    pub skipped_tasks: Vec<SkippedTask>,
    pub groups: Vec<GroupReport>,
    pub jobs: Vec<JobReport>,
    /// Store read failures.
    pub errors: Vec<String>,
}

/// The run-cycle orchestrator.
pub struct DispatchCycle {
    store: Arc<dyn BriefStore>,
    processor: GroupProcessor,
    dispatcher: Dispatcher,
    recorder: RunStateRecorder,
    settings: CycleSettings,
}

impl DispatchCycle {
    pub fn new(
        store: Arc<dyn BriefStore>,
        news: Arc<dyn NewsSource>,
        summarizer: Arc<dyn Summarizer>,
        generator: Arc<dyn Generator>,
        notifiers: Vec<Arc<dyn Notifier>>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            processor: GroupProcessor::new(news, summarizer, generator, settings.process.clone()),
            dispatcher: Dispatcher::new(notifiers, settings.site_url.clone(), settings.send_timeout),
            recorder: RunStateRecorder::new(store.clone(), settings.store_timeout),
            store,
            settings,
        }
    }

    async fn read<T, F>(&self, what: &str, fut: F, errors: &mut Vec<String>) -> Vec<T>
    where
        F: std::future::Future<Output = Result<Vec<T>>>,
    {
        let loaded = match timeout(self.settings.store_timeout, fut).await {
            Ok(loaded) => loaded,
            Err(_) => Err(BriefError::Timeout(
                self.settings.store_timeout.as_secs(),
                format!("loading {what}"),
            )),
        };
        loaded.unwrap_or_else(|e| {
            tracing::error!("❌ Failed to load {what}: {e}");
            errors.push(format!("{what}: {e}"));
            Vec::new()
        })
    }

    /// Run one cycle as of `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport {
            started_at: Some(now),
            ..CycleReport::default()
        };

        let tasks = self
            .read("tasks", self.store.enabled_tasks(), &mut report.errors)
            .await;
        let subscriptions = self
            .read(
                "subscriptions",
                self.store.prompt_subscriptions(),
                &mut report.errors,
            )
            .await;

        let assembly = assemble(&tasks, &subscriptions, now, &self.settings.defaults);
        report.due = assembly.jobs.len();
        report.skipped_tasks = assembly.skipped;

        let groups = group_jobs(assembly.jobs);
        tracing::info!(
            "⏰ Cycle: {} task(s), {} subscription(s), {} due job(s) in {} group(s)",
            tasks.len(),
            subscriptions.len(),
            report.due,
            groups.len()
        );

        let mut processed: Vec<(usize, GroupReport, Vec<JobReport>)> = stream::iter(
            groups.into_iter().enumerate(),
        )
        .map(|(index, group)| async move {
            let (group_report, jobs) = self.run_group(group, now).await;
            (index, group_report, jobs)
        })
        .buffer_unordered(self.settings.max_concurrent_groups.max(1))
        .collect()
        .await;
        processed.sort_by_key(|(index, _, _)| *index);

        for (_, group_report, jobs) in processed {
            if group_report.error.is_some() {
                report.failed_groups += 1;
            }
            report.sent += jobs.iter().filter(|j| j.outcome.any_delivered()).count();
            report.groups.push(group_report);
            report.jobs.extend(jobs);
        }

        tracing::info!(
            "✅ Cycle done: {} sent, {} failed group(s), {} skipped task(s)",
            report.sent,
            report.failed_groups,
            report.skipped_tasks.len()
        );
        report
    }

    async fn run_group(&self, group: Group, now: DateTime<Utc>) -> (GroupReport, Vec<JobReport>) {
        let mut group_report = GroupReport {
            key: group.key.clone(),
            jobs: group.jobs.len(),
            path: None,
            error: None,
        };

        match self.processor.process(&group.key).await {
            GroupOutcome::Failed(reason) => {
                tracing::error!(
                    "❌ Group '{}' ({}/{}) failed: {}",
                    group.key.request,
                    group.key.provider,
                    group.key.model,
                    reason
                );
                group_report.error = Some(reason);
                (group_report, Vec::new())
            }
            GroupOutcome::Ready { result, path } => {
                group_report.path = Some(path);
                let mut sends = Vec::with_capacity(group.jobs.len());
                for job in &group.jobs {
                    sends.push(self.run_job(job, &result, now));
                }
                (group_report, join_all(sends).await)
            }
        }
    }

    async fn run_job(&self, job: &Job, result: &SummaryResult, now: DateTime<Utc>) -> JobReport {
        self.recorder.begin(job, now).await;
        let channels = self.dispatcher.dispatch(job, result).await;
        let outcome = JobOutcome::from_channels(&channels);
        self.recorder
            .finish(job, outcome, &channels, result, now)
            .await;

        tracing::info!("📤 {:?} '{}' ({}): {:?}", job.source, job.name, job.source_id, outcome);
        JobReport {
            source: job.source,
            id: job.source_id.clone(),
            name: job.name.clone(),
            outcome,
            channels,
        }
    }
}
