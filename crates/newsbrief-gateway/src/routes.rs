//! API route handlers for the gateway.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
};
use newsbrief_core::types::{DeliveryChannel, Message};
use newsbrief_scheduler::{
    Cadence, CycleReport, Subscription, SubscriptionRequest, Task, cron,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::server::AppState;

/// Newest tasks returned by `GET /api/tasks`.
const TASK_LIST_LIMIT: usize = 200;

/// Words kept from a prompt when no search query could be generated.
const QUERY_FALLBACK_WORDS: usize = 8;

const QUERY_SYSTEM_PROMPT: &str = "You are a helper that translates a user's natural language request \
into a concise search query suitable for a news search API. Output only the query string.";

type ApiResponse = (StatusCode, Json<serde_json::Value>);

fn ok(body: serde_json::Value) -> ApiResponse {
    (StatusCode::OK, Json(body))
}

fn api_error(status: StatusCode, message: &str) -> ApiResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Trimmed, non-blank string field.
fn text_field<'a>(body: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    body[key].as_str().map(str::trim).filter(|s| !s.is_empty())
}

fn first_words(text: &str, n: usize) -> String {
    text.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}

/// Comma-separated topics, trimmed, blanks dropped.
fn split_topics(topics: &str) -> Vec<&str> {
    topics
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Missing → `[email]`. Otherwise a non-empty array of channel names.
fn parse_channels(value: &serde_json::Value) -> Result<Vec<DeliveryChannel>, String> {
    if value.is_null() {
        return Ok(vec![DeliveryChannel::Email]);
    }
    let Some(items) = value.as_array() else {
        return Err("channels must be an array".into());
    };
    let channels = items
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| "channel names must be strings".to_string())?
                .parse::<DeliveryChannel>()
                .map_err(|e| e.to_string())
        })
        .collect::<Result<Vec<_>, _>>()?;
    if channels.is_empty() {
        return Err("at least one channel is required".into());
    }
    Ok(channels)
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "newsbrief-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

// ═══════════════════════════════════════════════════════
// Scheduled trigger
// ═══════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub report: CycleReport,
}

/// Run one dispatch cycle. The secret check lives in the router middleware.
pub async fn send_scheduled(State(state): State<Arc<AppState>>) -> Json<TriggerResponse> {
    tracing::info!("⏰ Scheduled trigger received");
    let report = state.cycle.run(chrono::Utc::now()).await;
    Json(TriggerResponse { ok: true, report })
}

// ═══════════════════════════════════════════════════════
// Tasks
// ═══════════════════════════════════════════════════════

/// A task as listed, with its upcoming fire time.
#[derive(Debug, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    /// Next occurrence after now; `None` when the schedule no longer parses.
    pub next_run: Option<chrono::DateTime<chrono::Utc>>,
}

impl TaskView {
    fn new(task: Task, now: chrono::DateTime<chrono::Utc>) -> Self {
        let next_run = cron::next_occurrence(&task.cron, &task.timezone, now)
            .inspect_err(|e| tracing::debug!("Task {} has no next run: {e}", task.id))
            .ok()
            .flatten();
        Self { task, next_run }
    }
}

/// List the newest tasks.
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> ApiResponse {
    match state.store.list_tasks(TASK_LIST_LIMIT).await {
        Ok(tasks) => {
            let now = chrono::Utc::now();
            let tasks: Vec<TaskView> = tasks.into_iter().map(|t| TaskView::new(t, now)).collect();
            ok(serde_json::json!({"ok": true, "count": tasks.len(), "tasks": tasks}))
        }
        Err(e) => {
            tracing::error!("❌ Failed to list tasks: {e}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "DB error")
        }
    }
}

/// Create a scheduled task.
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> ApiResponse {
    let Some(prompt) = text_field(&body, "prompt") else {
        return api_error(StatusCode::BAD_REQUEST, "Prompt required");
    };
    let Some(cron_expr) = text_field(&body, "cron_expr").or_else(|| text_field(&body, "cron")) else {
        return api_error(StatusCode::BAD_REQUEST, "cron_expr required");
    };
    let timezone = text_field(&body, "timezone").unwrap_or("UTC");
    if let Err(e) = cron::validate(cron_expr, timezone) {
        return api_error(StatusCode::BAD_REQUEST, &e.to_string());
    }
    let channels = match parse_channels(&body["channels"]) {
        Ok(c) => c,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, &e),
    };

    let owner = text_field(&body, "owner_email")
        .or_else(|| text_field(&body, "to_email"))
        .unwrap_or("anonymous");
    let llm = &state.config.llm;
    let mut task = Task::new(owner, text_field(&body, "name").unwrap_or("task"), prompt, cron_expr);
    task.provider = text_field(&body, "model_provider")
        .unwrap_or(&llm.default_provider)
        .to_string();
    task.model = text_field(&body, "model").unwrap_or(&llm.default_model).to_string();
    task.timezone = timezone.to_string();
    task.channels = channels;
    task.to_email = text_field(&body, "to_email").map(String::from);
    task.to_whatsapp = text_field(&body, "to_whatsapp").map(String::from);
    task.enabled = body["enabled"].as_bool() != Some(false);

    match state.store.create_task(&task).await {
        Ok(()) => {
            tracing::info!("📅 Task created: '{}' ({}) cron={}", task.name, task.id, task.cron);
            ok(serde_json::json!({"ok": true, "task": task}))
        }
        Err(e) => {
            tracing::error!("❌ Failed to create task: {e}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "DB error")
        }
    }
}

/// Run log of one task, newest first.
pub async fn task_runs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    match state.store.task_runs(&id).await {
        Ok(runs) => ok(serde_json::json!({"ok": true, "runs": runs})),
        Err(e) => {
            tracing::error!("❌ Failed to load runs for task {id}: {e}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "DB error")
        }
    }
}

// ═══════════════════════════════════════════════════════
// Subscriptions
// ═══════════════════════════════════════════════════════

/// Subscribe an email address, by topic filter or by free-form prompt.
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> ApiResponse {
    let (Some(email), Some(mode)) = (text_field(&body, "email"), text_field(&body, "mode")) else {
        return api_error(StatusCode::BAD_REQUEST, "Missing fields");
    };

    let llm = &state.config.llm;
    let provider = text_field(&body, "model_provider").unwrap_or(&llm.default_provider);
    let model = text_field(&body, "model").unwrap_or(&llm.default_model);
    let cadence = Cadence::from_freq(body["freq"].as_str().unwrap_or("daily"));
    let timezone = text_field(&body, "timezone").unwrap_or("UTC");
    let send_time = text_field(&body, "send_time").map(String::from);

    let build = |request: SubscriptionRequest| {
        let mut sub = Subscription::new(email, request);
        sub.provider = provider.to_string();
        sub.model = model.to_string();
        sub.cadence = cadence;
        sub.timezone = timezone.to_string();
        sub.send_time = send_time.clone();
        sub
    };

    match mode {
        "filter" => {
            let topics = split_topics(body["topics"].as_str().unwrap_or(""));
            if topics.is_empty() {
                return api_error(StatusCode::BAD_REQUEST, "No topics");
            }
            let mut added = 0;
            for topic in topics {
                let sub = build(SubscriptionRequest::Filter {
                    topic: topic.to_string(),
                });
                if let Err(e) = state.store.upsert_filter_subscription(&sub).await {
                    tracing::error!("❌ Subscription upsert failed for {email}: {e}");
                    return api_error(StatusCode::INTERNAL_SERVER_ERROR, "DB error");
                }
                added += 1;
            }
            tracing::info!("📬 {email} subscribed to {added} topic(s)");
            ok(serde_json::json!({"ok": true, "added": added}))
        }
        "prompt" => {
            let Some(prompt) = text_field(&body, "prompt") else {
                return api_error(StatusCode::BAD_REQUEST, "Prompt required");
            };
            let sub = build(SubscriptionRequest::Prompt {
                prompt: prompt.to_string(),
            });
            if let Err(e) = state.store.create_subscription(&sub).await {
                tracing::error!("❌ Subscription insert failed for {email}: {e}");
                return api_error(StatusCode::INTERNAL_SERVER_ERROR, "DB error");
            }
            tracing::info!("📬 {email} subscribed with a custom prompt");
            ok(serde_json::json!({"ok": true, "added": 1}))
        }
        _ => api_error(StatusCode::BAD_REQUEST, "Invalid mode"),
    }
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeParams {
    pub token: Option<String>,
}

/// One-click unsubscribe link target.
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UnsubscribeParams>,
) -> (StatusCode, Html<&'static str>) {
    let Some(token) = params.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Html("<h3>Invalid unsubscribe link</h3>"),
        );
    };

    match state.store.delete_subscription_by_token(token).await {
        Ok(0) => (
            StatusCode::OK,
            Html("<h3>No subscription found for this link (or already unsubscribed).</h3>"),
        ),
        Ok(_) => {
            tracing::info!("📭 Subscription removed via unsubscribe link");
            (
                StatusCode::OK,
                Html("<h3>You have been unsubscribed. Thank you.</h3>"),
            )
        }
        Err(e) => {
            tracing::error!("❌ Unsubscribe failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("<h3>Unable to process unsubscribe. Try again later.</h3>"),
            )
        }
    }
}

// ═══════════════════════════════════════════════════════
// Preview
// ═══════════════════════════════════════════════════════

/// Ask the generator for a news search query; first line wins.
/// Falls back to the leading words of the prompt.
async fn search_query(state: &AppState, prompt: &str, provider: &str, model: &str) -> String {
    let messages = [
        Message::system(QUERY_SYSTEM_PROMPT),
        Message::user(format!(
            "User request: {prompt}\n\nReturn ONLY the query string (no explanation)."
        )),
    ];
    let limit = Duration::from_secs(state.config.scheduler.generate_timeout_secs);
    let parsed = match tokio::time::timeout(limit, state.generator.generate(provider, model, &messages)).await {
        Ok(Ok(text)) => text.lines().next().unwrap_or("").trim().to_string(),
        Ok(Err(e)) => {
            tracing::warn!("⚠️ Query generation failed, using keywords: {e}");
            String::new()
        }
        Err(_) => {
            tracing::warn!("⚠️ Query generation timed out after {limit:?}, using keywords");
            String::new()
        }
    };

    if parsed.is_empty() {
        first_words(prompt, QUERY_FALLBACK_WORDS)
    } else {
        parsed
    }
}

/// One-off brief for the given request. Nothing is stored or sent.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> ApiResponse {
    let Some(mode) = text_field(&body, "mode") else {
        return api_error(StatusCode::BAD_REQUEST, "Missing mode");
    };
    let llm = &state.config.llm;
    let provider = text_field(&body, "model_provider").unwrap_or(&llm.default_provider);
    let model = text_field(&body, "model").unwrap_or(&llm.default_model);

    let (query, label, title) = if mode == "filter" {
        let raw = body["topics"].as_str().unwrap_or("");
        let topics = split_topics(raw);
        if topics.is_empty() {
            return api_error(StatusCode::BAD_REQUEST, "No topics provided");
        }
        let query = topics.join(" OR ");
        (query, raw.trim().to_string(), format!("Brief for {}", raw.trim()))
    } else {
        let Some(prompt) = text_field(&body, "prompt") else {
            return api_error(StatusCode::BAD_REQUEST, "Prompt required");
        };
        let query = search_query(&state, prompt, provider, model).await;
        (query, prompt.to_string(), "Brief for custom prompt".to_string())
    };

    let scheduler = &state.config.scheduler;
    let fetch_limit = Duration::from_secs(scheduler.fetch_timeout_secs);
    let articles = match tokio::time::timeout(
        fetch_limit,
        state.news.search(&query, scheduler.article_page_size),
    )
    .await
    {
        Ok(articles) => articles,
        Err(_) => {
            tracing::warn!("⏱️ Preview fetch for '{query}' timed out after {fetch_limit:?}");
            Vec::new()
        }
    };
    tracing::info!("🔎 Preview '{query}': {} article(s)", articles.len());
    if articles.is_empty() {
        return ok(serde_json::json!({
            "ok": true,
            "title": format!("No articles found for \"{query}\""),
            "query": query,
            "summary": "",
            "notes": {},
            "articles": [],
        }));
    }

    let generate_limit = Duration::from_secs(scheduler.generate_timeout_secs);
    let summary = tokio::time::timeout(
        generate_limit,
        state.summarizer.summarize(&label, &articles, provider, model),
    )
    .await;
    match summary {
        Ok(Some(result)) => ok(serde_json::json!({
            "ok": true,
            "title": title,
            "query": query,
            "summary": result.summary,
            "notes": result.notes,
            "articles": result.articles,
        })),
        Ok(None) => api_error(StatusCode::INTERNAL_SERVER_ERROR, "Summarization failed"),
        Err(_) => {
            tracing::warn!("⏱️ Preview summary for '{query}' timed out after {generate_limit:?}");
            api_error(StatusCode::GATEWAY_TIMEOUT, "Summarization timed out")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{AppState, SECRET_HEADER, build_router};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use newsbrief_core::config::BriefConfig;
    use newsbrief_core::error::{BriefError, Result};
    use newsbrief_core::traits::{Generator, NewsSource, Notifier, Summarizer};
    use newsbrief_core::types::{Article, Notes, OutgoingMessage, SummaryResult};
    use newsbrief_scheduler::{BriefDb, CycleSettings, DispatchCycle};
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct StaticNews {
        articles: Vec<Article>,
        delay: Duration,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NewsSource for StaticNews {
        async fn search(&self, query: &str, limit: usize) -> Vec<Article> {
            self.queries.lock().unwrap().push(query.to_string());
            tokio::time::sleep(self.delay).await;
            self.articles.iter().take(limit).cloned().collect()
        }
    }

    struct StaticSummarizer(Option<String>, Duration);

    #[async_trait]
    impl Summarizer for StaticSummarizer {
        async fn summarize(
            &self,
            _topic: &str,
            articles: &[Article],
            _provider: &str,
            _model: &str,
        ) -> Option<SummaryResult> {
            tokio::time::sleep(self.1).await;
            self.0.as_ref().map(|summary| SummaryResult {
                summary: summary.clone(),
                notes: Notes {
                    impact: "Impact".into(),
                    opportunity: "Opportunity".into(),
                    risk: "Risk".into(),
                },
                articles: articles.to_vec(),
            })
        }
    }

    struct StaticGenerator(std::result::Result<String, String>);

    #[async_trait]
    impl Generator for StaticGenerator {
        async fn generate(&self, _provider: &str, _model: &str, _messages: &[Message]) -> Result<String> {
            self.0.clone().map_err(BriefError::Provider)
        }
    }

    #[derive(Default)]
    struct RecordingEmail {
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    #[async_trait]
    impl Notifier for RecordingEmail {
        fn channel(&self) -> DeliveryChannel {
            DeliveryChannel::Email
        }

        async fn send(&self, message: &OutgoingMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn article(title: &str) -> Article {
        Article {
            title: title.into(),
            description: String::new(),
            url: format!("https://news.example.com/{title}"),
            source: "Example Wire".into(),
            published_at: None,
        }
    }

    struct Harness {
        db: Arc<BriefDb>,
        news: Arc<StaticNews>,
        email: Arc<RecordingEmail>,
        app: axum::Router,
    }

    fn harness_with(
        articles: Vec<Article>,
        summary: Option<&str>,
        generated: std::result::Result<&str, &str>,
    ) -> Harness {
        build_harness(articles, summary, generated, Duration::ZERO, Duration::ZERO)
    }

    fn build_harness(
        articles: Vec<Article>,
        summary: Option<&str>,
        generated: std::result::Result<&str, &str>,
        news_delay: Duration,
        summary_delay: Duration,
    ) -> Harness {
        let mut config = BriefConfig::default();
        config.scheduler.secret = "s3cret".into();
        config.scheduler.fetch_timeout_secs = 1;
        config.scheduler.generate_timeout_secs = 1;

        let db = Arc::new(BriefDb::in_memory().unwrap());
        let news = Arc::new(StaticNews {
            articles,
            delay: news_delay,
            queries: Mutex::new(Vec::new()),
        });
        let summarizer = Arc::new(StaticSummarizer(summary.map(String::from), summary_delay));
        let generator = Arc::new(StaticGenerator(
            generated.map(String::from).map_err(String::from),
        ));
        let email = Arc::new(RecordingEmail::default());

        let cycle = DispatchCycle::new(
            db.clone(),
            news.clone(),
            summarizer.clone(),
            generator.clone(),
            vec![email.clone() as Arc<dyn Notifier>],
            CycleSettings::from_config(&config),
        );
        let state = AppState {
            config,
            start_time: std::time::Instant::now(),
            cycle: Arc::new(cycle),
            store: db.clone(),
            news: news.clone(),
            summarizer,
            generator,
        };
        Harness {
            db,
            news,
            email,
            app: build_router(state),
        }
    }

    fn harness() -> Harness {
        harness_with(vec![article("a"), article("b")], Some("Summary"), Ok("rust language\nignored"))
    }

    async fn call(app: &axum::Router, req: Request<Body>) -> (StatusCode, String) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn json(text: &str) -> serde_json::Value {
        serde_json::from_str(text).unwrap()
    }

    // ---- Health & trigger ----

    #[tokio::test]
    async fn test_health_check() {
        let h = harness();
        let (status, body) = call(&h.app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["status"], "ok");
        assert!(body["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn test_trigger_requires_secret() {
        let h = harness();
        let (status, body) = call(&h.app, Request::post("/api/send-scheduled").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json(&body), serde_json::json!({"error": "Unauthorized"}));

        let wrong = Request::post("/api/send-scheduled")
            .header(SECRET_HEADER, "nope")
            .body(Body::empty())
            .unwrap();
        assert_eq!(call(&h.app, wrong).await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_trigger_rejects_get() {
        let h = harness();
        let req = Request::get("/api/send-scheduled")
            .header(SECRET_HEADER, "s3cret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(call(&h.app, req).await.0, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_trigger_runs_cycle() {
        let h = harness();
        let mut task = Task::new("o@example.com", "Hourly", "rust", "0 * * * *");
        task.to_email = Some("o@example.com".into());
        newsbrief_scheduler::BriefStore::create_task(h.db.as_ref(), &task)
            .await
            .unwrap();

        let req = Request::post("/api/send-scheduled")
            .header(SECRET_HEADER, "s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&h.app, req).await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["ok"], true);
        assert_eq!(body["sent"], 1);
        assert_eq!(h.email.sent.lock().unwrap().len(), 1);
        assert!(h.db.get_task(&task.id).unwrap().unwrap().last_run.is_some());
    }

    // ---- Tasks ----

    #[tokio::test]
    async fn test_create_task_validates_input() {
        let h = harness();
        let (status, _) = call(&h.app, post_json("/api/tasks", serde_json::json!({"cron_expr": "0 8 * * *"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &h.app,
            post_json("/api/tasks", serde_json::json!({"prompt": "rust", "cron_expr": "61 * * * *"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json(&body)["error"].as_str().unwrap().contains("cron"));

        let (status, _) = call(
            &h.app,
            post_json(
                "/api/tasks",
                serde_json::json!({"prompt": "rust", "cron_expr": "0 8 * * *", "timezone": "Mars/Base"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &h.app,
            post_json(
                "/api/tasks",
                serde_json::json!({"prompt": "rust", "cron_expr": "0 8 * * *", "channels": ["fax"]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_and_list_tasks() {
        let h = harness();
        let (status, body) = call(
            &h.app,
            post_json(
                "/api/tasks",
                serde_json::json!({"prompt": "AI chips", "cron_expr": "0 8 * * *", "to_email": "o@example.com"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let task = &json(&body)["task"];
        assert_eq!(task["owner"], "o@example.com");
        assert_eq!(task["name"], "task");
        assert_eq!(task["provider"], "openai");
        assert_eq!(task["timezone"], "UTC");
        assert_eq!(task["channels"], serde_json::json!(["email"]));
        assert_eq!(task["enabled"], true);

        let (status, body) = call(&h.app, Request::get("/api/tasks").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["count"], 1);
        assert_eq!(body["tasks"][0]["prompt"], "AI chips");
        let next_run: chrono::DateTime<chrono::Utc> = body["tasks"][0]["next_run"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(next_run > chrono::Utc::now());
        assert_eq!(next_run.format("%H:%M:%S").to_string(), "08:00:00");

        let id = body["tasks"][0]["id"].as_str().unwrap();
        let (status, runs) = call(
            &h.app,
            Request::get(format!("/api/tasks/{id}/runs")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&runs)["runs"], serde_json::json!([]));
    }

    // ---- Subscriptions ----

    #[tokio::test]
    async fn test_subscribe_filter_upserts_per_topic() {
        let h = harness();
        let body = serde_json::json!({"email": "a@example.com", "mode": "filter", "topics": "rust, ai ,"});
        let (status, resp) = call(&h.app, post_json("/api/subscribe", body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&resp)["added"], 2);

        let (status, _) = call(&h.app, post_json("/api/subscribe", body)).await;
        assert_eq!(status, StatusCode::OK);
        let subs = h.db.all_subscriptions().unwrap();
        assert_eq!(subs.len(), 2);
        assert!(subs.iter().all(|s| s.cadence == Cadence::Daily));
    }

    #[tokio::test]
    async fn test_subscribe_prompt_mode() {
        let h = harness();
        let (status, _) = call(
            &h.app,
            post_json(
                "/api/subscribe",
                serde_json::json!({"email": "a@example.com", "mode": "prompt", "prompt": "chip export rules", "freq": "hourly"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let subs = h.db.all_subscriptions().unwrap();
        assert_eq!(subs[0].cadence, Cadence::Hourly);
        assert_eq!(subs[0].request.mode(), "prompt");
    }

    #[tokio::test]
    async fn test_subscribe_rejects_bad_input() {
        let h = harness();
        for body in [
            serde_json::json!({"mode": "filter", "topics": "rust"}),
            serde_json::json!({"email": "a@example.com", "mode": "weekly"}),
            serde_json::json!({"email": "a@example.com", "mode": "prompt", "prompt": "  "}),
            serde_json::json!({"email": "a@example.com", "mode": "filter", "topics": " , "}),
        ] {
            let (status, _) = call(&h.app, post_json("/api/subscribe", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert!(h.db.all_subscriptions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_flow() {
        let h = harness();
        let (status, body) = call(&h.app, Request::get("/api/unsubscribe").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Invalid"));

        let (status, body) = call(
            &h.app,
            Request::get("/api/unsubscribe?token=unknown").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("No subscription found"));

        call(
            &h.app,
            post_json(
                "/api/subscribe",
                serde_json::json!({"email": "a@example.com", "mode": "prompt", "prompt": "rust"}),
            ),
        )
        .await;
        let token = h.db.all_subscriptions().unwrap()[0].unsubscribe_token.clone();
        let (status, body) = call(
            &h.app,
            Request::get(format!("/api/unsubscribe?token={token}")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("unsubscribed"));
        assert!(h.db.all_subscriptions().unwrap().is_empty());
    }

    // ---- Preview ----

    #[tokio::test]
    async fn test_preview_filter_joins_topics() {
        let h = harness();
        let (status, body) = call(
            &h.app,
            post_json("/api/preview", serde_json::json!({"mode": "filter", "topics": "rust, ai"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["summary"], "Summary");
        assert_eq!(body["title"], "Brief for rust, ai");
        assert_eq!(body["articles"].as_array().unwrap().len(), 2);
        assert_eq!(h.news.queries.lock().unwrap()[0], "rust OR ai");
    }

    #[tokio::test]
    async fn test_preview_prompt_uses_generated_query() {
        let h = harness();
        let (status, _) = call(
            &h.app,
            post_json("/api/preview", serde_json::json!({"mode": "prompt", "prompt": "what is new in rust"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.news.queries.lock().unwrap()[0], "rust language");
    }

    #[tokio::test]
    async fn test_preview_prompt_falls_back_to_keywords() {
        let h = harness_with(vec![article("a")], Some("Summary"), Err("down"));
        call(
            &h.app,
            post_json(
                "/api/preview",
                serde_json::json!({"mode": "prompt", "prompt": "one two three four five six seven eight nine ten"}),
            ),
        )
        .await;
        assert_eq!(
            h.news.queries.lock().unwrap()[0],
            "one two three four five six seven eight"
        );
    }

    #[tokio::test]
    async fn test_preview_without_articles() {
        let h = harness_with(vec![], Some("Summary"), Ok("rust"));
        let (status, body) = call(
            &h.app,
            post_json("/api/preview", serde_json::json!({"mode": "filter", "topics": "rust"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["summary"], "");
        assert_eq!(body["title"], "No articles found for \"rust\"");
    }

    #[tokio::test]
    async fn test_preview_summarizer_failure() {
        let h = harness_with(vec![article("a")], None, Ok("rust"));
        let (status, body) = call(
            &h.app,
            post_json("/api/preview", serde_json::json!({"mode": "filter", "topics": "rust"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(&body)["error"], "Summarization failed");
    }

    #[tokio::test]
    async fn test_preview_slow_news_counts_as_no_articles() {
        let h = build_harness(vec![article("a")], Some("Summary"), Ok("rust"), Duration::from_secs(30), Duration::ZERO);
        let (status, body) = call(
            &h.app,
            post_json("/api/preview", serde_json::json!({"mode": "filter", "topics": "rust"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["title"], "No articles found for \"rust\"");
        assert_eq!(body["articles"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_preview_slow_summarizer_times_out() {
        let h = build_harness(vec![article("a")], Some("Summary"), Ok("rust"), Duration::ZERO, Duration::from_secs(30));
        let (status, body) = call(
            &h.app,
            post_json("/api/preview", serde_json::json!({"mode": "filter", "topics": "rust"})),
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json(&body)["error"], "Summarization timed out");
    }

    #[test]
    fn test_parse_channels() {
        assert_eq!(parse_channels(&serde_json::Value::Null).unwrap(), vec![DeliveryChannel::Email]);
        assert_eq!(
            parse_channels(&serde_json::json!(["email", "whatsapp"])).unwrap(),
            vec![DeliveryChannel::Email, DeliveryChannel::Whatsapp]
        );
        assert!(parse_channels(&serde_json::json!([])).is_err());
        assert!(parse_channels(&serde_json::json!("email")).is_err());
    }
}
