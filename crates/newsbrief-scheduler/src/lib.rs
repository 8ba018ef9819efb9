//! # NewsBrief Scheduler
//!
//! Turns stored tasks and subscriptions into delivered briefs.
//!
//! ## Architecture
//! ```text
//! DispatchCycle::run(now)
//!   ├── BriefStore → enabled tasks + prompt subscriptions
//!   ├── due rules → Jobs (bad cron = skipped task, not a failed cycle)
//!   ├── group by (request, provider, model)
//!   ├── per group (bounded concurrency)
//!   │     └── GroupProcessor: fetch → summarize | generate fallback
//!   └── per job
//!         ├── RunStateRecorder::begin   (task last_run)
//!         ├── Dispatcher → Email / WhatsApp (concurrent, each with a timeout)
//!         └── RunStateRecorder::finish  (subscription last_sent, task run log)
//! ```

pub mod cron;
pub mod cycle;
pub mod dispatch;
pub mod due;
pub mod jobs;
pub mod persistence;
pub mod process;
pub mod recorder;
pub mod render;
pub mod store;
pub mod tasks;

#[cfg(test)]
mod testing;

pub use cycle::{CycleReport, CycleSettings, DispatchCycle, GroupReport, JobReport};
pub use dispatch::{ChannelOutcome, Dispatcher, JobOutcome};
pub use jobs::{Group, GroupKey, Job, JobDefaults, JobSource};
pub use persistence::BriefDb;
pub use process::{ContentPath, GroupOutcome, GroupProcessor, ProcessSettings};
pub use recorder::RunStateRecorder;
pub use render::RenderedBrief;
pub use store::BriefStore;
pub use tasks::{Cadence, RunStatus, Subscription, SubscriptionRequest, Task, TaskRun};
