//! SQLite-backed persistence for tasks, subscriptions, and task run logs.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use newsbrief_core::error::{BriefError, Result};
use newsbrief_core::types::DeliveryChannel;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::store::BriefStore;
use crate::tasks::{Cadence, RunStatus, Subscription, SubscriptionRequest, Task, TaskRun};

const TASK_COLUMNS: &str = "id, owner, name, prompt, provider, model, cron, timezone, channels, \
                            to_email, to_whatsapp, enabled, last_run, created_at";
const SUB_COLUMNS: &str = "id, email, mode, topic, prompt, provider, model, freq, timezone, \
                           send_time, last_sent, unsubscribe_token, created_at";

/// SQLite store for all brief data.
pub struct BriefDb {
    conn: Mutex<Connection>,
}

fn store_err(context: &str) -> impl Fn(rusqlite::Error) -> BriefError + '_ {
    move |e| BriefError::Store(format!("{context}: {e}"))
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

impl BriefDb {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err("DB open"))?;
        // WAL lets the gateway read while a cycle writes.
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        Self::with_connection(conn)
    }

    /// Throwaway in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err("DB open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| BriefError::Store(format!("Lock: {e}")))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL DEFAULT 'anonymous',
                name TEXT NOT NULL DEFAULT 'task',
                prompt TEXT NOT NULL,
                provider TEXT NOT NULL DEFAULT 'openai',
                model TEXT NOT NULL DEFAULT '',
                cron TEXT NOT NULL,
                timezone TEXT NOT NULL DEFAULT 'UTC',
                channels TEXT NOT NULL DEFAULT '[\"email\"]',   -- JSON array
                to_email TEXT,
                to_whatsapp TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                last_run TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS subscriptions (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                mode TEXT NOT NULL,               -- 'filter' or 'prompt'
                topic TEXT,                       -- filter mode only
                prompt TEXT,                      -- prompt mode only
                provider TEXT NOT NULL DEFAULT 'openai',
                model TEXT NOT NULL DEFAULT '',
                freq TEXT NOT NULL DEFAULT 'daily',
                timezone TEXT NOT NULL DEFAULT 'UTC',
                send_time TEXT,
                last_sent TEXT,
                unsubscribe_token TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                UNIQUE (email, topic)
            );

            CREATE TABLE IF NOT EXISTS task_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                status TEXT NOT NULL,             -- ok, partial, error
                result TEXT,
                error TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_task_runs_task ON task_runs(task_id, created_at);
            ",
        )
        .map_err(store_err("Migration"))?;
        Ok(())
    }

    fn query_tasks(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(store_err("Prepare tasks"))?;
        let rows = stmt
            .query_map(params, row_to_task)
            .map_err(store_err("Query tasks"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err("Read task"))
    }

    fn subscription_by_email_topic(&self, email: &str, topic: &str) -> Result<Option<Subscription>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {SUB_COLUMNS} FROM subscriptions WHERE email = ?1 AND topic = ?2"),
            params![email, topic],
            row_to_subscription,
        )
        .optional()
        .map_err(store_err("Load subscription"))
    }

    /// Look up a single task (used by the CLI and tests).
    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        Ok(self
            .query_tasks(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"), [id])?
            .into_iter()
            .next())
    }

    /// All subscriptions regardless of mode.
    pub fn all_subscriptions(&self) -> Result<Vec<Subscription>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {SUB_COLUMNS} FROM subscriptions ORDER BY created_at"))
            .map_err(store_err("Prepare subscriptions"))?;
        let rows = stmt
            .query_map([], row_to_subscription)
            .map_err(store_err("Query subscriptions"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err("Read subscription"))
    }
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let channels: String = row.get(8)?;
    let last_run: Option<String> = row.get(12)?;
    let created_at: String = row.get(13)?;
    Ok(Task {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        prompt: row.get(3)?,
        provider: row.get(4)?,
        model: row.get(5)?,
        cron: row.get(6)?,
        timezone: row.get(7)?,
        channels: serde_json::from_str(&channels).unwrap_or_else(|_| vec![DeliveryChannel::Email]),
        to_email: row.get(9)?,
        to_whatsapp: row.get(10)?,
        enabled: row.get::<_, i64>(11)? != 0,
        last_run: last_run.as_deref().and_then(parse_ts),
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
    })
}

fn row_to_subscription(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    let mode: String = row.get(2)?;
    let topic: Option<String> = row.get(3)?;
    let prompt: Option<String> = row.get(4)?;
    let freq: String = row.get(7)?;
    let last_sent: Option<String> = row.get(10)?;
    let created_at: String = row.get(12)?;

    let request = if mode == "filter" {
        SubscriptionRequest::Filter {
            topic: topic.unwrap_or_default(),
        }
    } else {
        SubscriptionRequest::Prompt {
            prompt: prompt.unwrap_or_default(),
        }
    };

    Ok(Subscription {
        id: row.get(0)?,
        email: row.get(1)?,
        request,
        provider: row.get(5)?,
        model: row.get(6)?,
        cadence: Cadence::from_freq(&freq),
        timezone: row.get(8)?,
        send_time: row.get(9)?,
        last_sent: last_sent.as_deref().and_then(parse_ts),
        unsubscribe_token: row.get(11)?,
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
    })
}

fn request_columns(request: &SubscriptionRequest) -> (Option<&str>, Option<&str>) {
    match request {
        SubscriptionRequest::Filter { topic } => (Some(topic.as_str()), None),
        SubscriptionRequest::Prompt { prompt } => (None, Some(prompt.as_str())),
    }
}

#[async_trait]
impl BriefStore for BriefDb {
    async fn enabled_tasks(&self) -> Result<Vec<Task>> {
        self.query_tasks(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE enabled = 1 ORDER BY created_at"),
            [],
        )
    }

    async fn prompt_subscriptions(&self) -> Result<Vec<Subscription>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SUB_COLUMNS} FROM subscriptions WHERE mode = 'prompt' ORDER BY created_at"
            ))
            .map_err(store_err("Prepare subscriptions"))?;
        let rows = stmt
            .query_map([], row_to_subscription)
            .map_err(store_err("Query subscriptions"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err("Read subscription"))
    }

    async fn mark_task_run(&self, task_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE tasks SET last_run = ?1 WHERE id = ?2",
            params![ts(at), task_id],
        )
        .map_err(store_err("Mark task run"))?;
        Ok(())
    }

    async fn mark_subscription_sent(&self, subscription_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE subscriptions SET last_sent = ?1 WHERE id = ?2",
            params![ts(at), subscription_id],
        )
        .map_err(store_err("Mark subscription sent"))?;
        Ok(())
    }

    async fn append_task_run(&self, run: &TaskRun) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO task_runs (task_id, status, result, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.task_id,
                run.status.as_str(),
                run.result,
                run.error,
                ts(run.created_at),
            ],
        )
        .map_err(store_err("Append task run"))?;
        Ok(())
    }

    async fn delete_subscription_by_token(&self, token: &str) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM subscriptions WHERE unsubscribe_token = ?1",
            [token],
        )
        .map_err(store_err("Delete subscription"))
    }

    async fn list_tasks(&self, limit: usize) -> Result<Vec<Task>> {
        self.query_tasks(
            &format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC LIMIT ?1"),
            [limit as i64],
        )
    }

    async fn create_task(&self, task: &Task) -> Result<()> {
        let channels = serde_json::to_string(&task.channels)?;
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO tasks ({TASK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                task.id,
                task.owner,
                task.name,
                task.prompt,
                task.provider,
                task.model,
                task.cron,
                task.timezone,
                channels,
                task.to_email,
                task.to_whatsapp,
                task.enabled as i64,
                task.last_run.map(ts),
                ts(task.created_at),
            ],
        )
        .map_err(store_err("Create task"))?;
        tracing::info!("📅 Task created: '{}' ({})", task.name, task.id);
        Ok(())
    }

    async fn upsert_filter_subscription(&self, sub: &Subscription) -> Result<Subscription> {
        let SubscriptionRequest::Filter { topic } = &sub.request else {
            return Err(BriefError::Validation(
                "upsert_filter_subscription needs a filter subscription".into(),
            ));
        };
        {
            let conn = self.lock()?;
            // Existing rows keep their id, token and last_sent.
            conn.execute(
                &format!(
                    "INSERT INTO subscriptions ({SUB_COLUMNS})
                     VALUES (?1, ?2, 'filter', ?3, NULL, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(email, topic) DO UPDATE SET
                        provider = excluded.provider,
                        model = excluded.model,
                        freq = excluded.freq,
                        timezone = excluded.timezone,
                        send_time = excluded.send_time"
                ),
                params![
                    sub.id,
                    sub.email,
                    topic,
                    sub.provider,
                    sub.model,
                    sub.cadence.as_str(),
                    sub.timezone,
                    sub.send_time,
                    sub.last_sent.map(ts),
                    sub.unsubscribe_token,
                    ts(sub.created_at),
                ],
            )
            .map_err(store_err("Upsert subscription"))?;
        }
        self.subscription_by_email_topic(&sub.email, topic)?
            .ok_or_else(|| BriefError::Store("Upserted subscription vanished".into()))
    }

    async fn create_subscription(&self, sub: &Subscription) -> Result<()> {
        let (topic, prompt) = request_columns(&sub.request);
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO subscriptions ({SUB_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                sub.id,
                sub.email,
                sub.request.mode(),
                topic,
                prompt,
                sub.provider,
                sub.model,
                sub.cadence.as_str(),
                sub.timezone,
                sub.send_time,
                sub.last_sent.map(ts),
                sub.unsubscribe_token,
                ts(sub.created_at),
            ],
        )
        .map_err(store_err("Create subscription"))?;
        tracing::info!("📬 Subscription created for {} ({})", sub.email, sub.request.mode());
        Ok(())
    }

    async fn task_runs(&self, task_id: &str) -> Result<Vec<TaskRun>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT task_id, status, result, error, created_at FROM task_runs
                 WHERE task_id = ?1 ORDER BY created_at DESC, id DESC",
            )
            .map_err(store_err("Prepare task runs"))?;
        let rows = stmt
            .query_map([task_id], |row| {
                let status: String = row.get(1)?;
                let created_at: String = row.get(4)?;
                Ok(TaskRun {
                    task_id: row.get(0)?,
                    status: RunStatus::parse(&status),
                    result: row.get(2)?,
                    error: row.get(3)?,
                    created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
                })
            })
            .map_err(store_err("Query task runs"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err("Read task run"))
    }
}
