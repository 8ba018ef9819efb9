//! Brief dispatch. Renders a job's content and sends it to every requested
//! channel. Sends for one job run concurrently; each one is bounded by a timeout
//! and fails on its own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use newsbrief_core::error::BriefError;
use newsbrief_core::traits::Notifier;
use newsbrief_core::types::{DeliveryChannel, SummaryResult};
use serde::Serialize;
use tokio::time::timeout;

use crate::jobs::Job;
use crate::render::{RenderedBrief, render};

/// Result of one channel for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelOutcome {
    pub channel: DeliveryChannel,
    /// False when the send was never tried (no destination or no sender).
    pub attempted: bool,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChannelOutcome {
    fn skipped(channel: DeliveryChannel, reason: &str) -> Self {
        Self {
            channel,
            attempted: false,
            delivered: false,
            error: Some(reason.to_string()),
        }
    }
}

/// Aggregate delivery result of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    /// Every attempted send succeeded.
    Delivered,
    /// Some attempted sends succeeded.
    Partial,
    /// Nothing succeeded, or nothing could be attempted.
    Failed,
}

impl JobOutcome {
    pub fn from_channels(channels: &[ChannelOutcome]) -> Self {
        let attempted = channels.iter().filter(|c| c.attempted).count();
        let delivered = channels.iter().filter(|c| c.delivered).count();
        match (attempted, delivered) {
            (_, 0) => Self::Failed,
            (a, d) if a == d => Self::Delivered,
            _ => Self::Partial,
        }
    }

    pub fn any_delivered(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Routes rendered briefs to the configured senders.
pub struct Dispatcher {
    notifiers: HashMap<DeliveryChannel, Arc<dyn Notifier>>,
    site_url: String,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        notifiers: Vec<Arc<dyn Notifier>>,
        site_url: impl Into<String>,
        send_timeout: Duration,
    ) -> Self {
        let notifiers = notifiers.into_iter().map(|n| (n.channel(), n)).collect();
        Self {
            notifiers,
            site_url: site_url.into(),
            send_timeout,
        }
    }

    pub fn render(&self, job: &Job, result: &SummaryResult) -> RenderedBrief {
        render(
            &job.name,
            result,
            job.unsubscribe_token.as_deref(),
            &self.site_url,
        )
    }

    /// Send `result` for `job` over each requested channel.
    pub async fn dispatch(&self, job: &Job, result: &SummaryResult) -> Vec<ChannelOutcome> {
        let brief = self.render(job, result);

        let mut channels = job.channels.clone();
        channels.sort();
        channels.dedup();

        let sends = channels.into_iter().map(|channel| {
            let brief = &brief;
            async move {
                let Some(to) = job.destination(channel) else {
                    return ChannelOutcome::skipped(channel, "no destination");
                };
                let Some(notifier) = self.notifiers.get(&channel) else {
                    tracing::warn!("⚠️ {} requested for '{}' but not configured", channel, job.name);
                    return ChannelOutcome::skipped(channel, "channel not configured");
                };

                let message = brief.message_for(channel, to);
                let sent = match timeout(self.send_timeout, notifier.send(&message)).await {
                    Ok(sent) => sent,
                    Err(_) => Err(BriefError::Timeout(
                        self.send_timeout.as_secs(),
                        format!("{channel} send"),
                    )),
                };
                match sent {
                    Ok(()) => ChannelOutcome {
                        channel,
                        attempted: true,
                        delivered: true,
                        error: None,
                    },
                    Err(e) => {
                        tracing::error!("❌ {} delivery for '{}' failed: {}", channel, job.name, e);
                        ChannelOutcome {
                            channel,
                            attempted: true,
                            delivered: false,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
        });

        join_all(sends).await
    }
}
