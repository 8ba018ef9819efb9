//! Store abstraction for tasks, subscriptions, and run logs.
//! `BriefDb` is the SQLite implementation; tests use an in-memory double.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsbrief_core::error::Result;

use crate::tasks::{Subscription, Task, TaskRun};

#[async_trait]
pub trait BriefStore: Send + Sync {
    /// All enabled tasks.
    async fn enabled_tasks(&self) -> Result<Vec<Task>>;

    /// All prompt-mode subscriptions.
    async fn prompt_subscriptions(&self) -> Result<Vec<Subscription>>;

    async fn mark_task_run(&self, task_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn mark_subscription_sent(&self, subscription_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn append_task_run(&self, run: &TaskRun) -> Result<()>;

    /// Returns how many subscriptions were removed (0 or 1).
    async fn delete_subscription_by_token(&self, token: &str) -> Result<usize>;

    /// Newest first.
    async fn list_tasks(&self, limit: usize) -> Result<Vec<Task>>;

    async fn create_task(&self, task: &Task) -> Result<()>;

    /// Insert or update the (email, topic) row; returns the stored subscription.
    async fn upsert_filter_subscription(&self, sub: &Subscription) -> Result<Subscription>;

    async fn create_subscription(&self, sub: &Subscription) -> Result<()>;

    /// Newest first.
    async fn task_runs(&self, task_id: &str) -> Result<Vec<TaskRun>>;
}
