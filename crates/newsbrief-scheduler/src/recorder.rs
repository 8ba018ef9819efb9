//! Run-state recording. Write failures are logged and swallowed so one bad
//! write never aborts the rest of a cycle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use newsbrief_core::error::Result;
use newsbrief_core::types::SummaryResult;
use tokio::time::timeout;

use crate::dispatch::{ChannelOutcome, JobOutcome};
use crate::jobs::{Job, JobSource};
use crate::store::BriefStore;
use crate::tasks::{RunStatus, TaskRun};

pub struct RunStateRecorder {
    store: Arc<dyn BriefStore>,
    write_timeout: Duration,
}

impl RunStateRecorder {
    pub fn new(store: Arc<dyn BriefStore>, write_timeout: Duration) -> Self {
        Self {
            store,
            write_timeout,
        }
    }

    async fn write<F>(&self, what: &str, fut: F)
    where
        F: Future<Output = Result<()>>,
    {
        match timeout(self.write_timeout, fut).await {
            Ok(Ok(())) => tracing::debug!("💾 Store write '{what}' ok"),
            Ok(Err(e)) => tracing::error!("❌ Store write '{what}' failed: {e}"),
            Err(_) => {
                tracing::error!("⏱️ Store write '{what}' timed out after {:?}", self.write_timeout)
            }
        }
    }

    /// Consume a task's occurrence before its sends go out.
    pub async fn begin(&self, job: &Job, now: DateTime<Utc>) {
        if job.source == JobSource::Task {
            self.write("task last_run", self.store.mark_task_run(&job.source_id, now))
                .await;
        }
    }

    /// Record the outcome of a dispatched job.
    pub async fn finish(
        &self,
        job: &Job,
        outcome: JobOutcome,
        channels: &[ChannelOutcome],
        result: &SummaryResult,
        now: DateTime<Utc>,
    ) {
        match job.source {
            JobSource::Subscription => {
                if outcome.any_delivered() {
                    self.write(
                        "subscription last_sent",
                        self.store.mark_subscription_sent(&job.source_id, now),
                    )
                    .await;
                }
            }
            JobSource::Task => {
                let run = task_run(&job.source_id, outcome, channels, result, now);
                self.write("task run log", self.store.append_task_run(&run))
                    .await;
            }
        }
    }
}

fn task_run(
    task_id: &str,
    outcome: JobOutcome,
    channels: &[ChannelOutcome],
    result: &SummaryResult,
    now: DateTime<Utc>,
) -> TaskRun {
    let status = match outcome {
        JobOutcome::Delivered => RunStatus::Ok,
        JobOutcome::Partial => RunStatus::Partial,
        JobOutcome::Failed => RunStatus::Error,
    };

    let errors: Vec<String> = channels
        .iter()
        .filter(|c| !c.delivered)
        .filter_map(|c| c.error.as_ref().map(|e| format!("{}: {e}", c.channel)))
        .collect();
    let error = if channels.is_empty() {
        Some("no channels requested".to_string())
    } else if errors.is_empty() {
        None
    } else {
        Some(errors.join("; "))
    };

    TaskRun::new(
        task_id,
        status,
        Some(result.summary.as_str()),
        error.as_deref(),
        now,
    )
}
