//! HTTP server implementation using Axum.

use axum::response::{IntoResponse, Response};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use newsbrief_core::config::BriefConfig;
use newsbrief_core::traits::{Generator, NewsSource, Summarizer};
use newsbrief_scheduler::{BriefStore, DispatchCycle};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Header carrying the pre-shared trigger secret.
pub const SECRET_HEADER: &str = "x-scheduler-secret";

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub config: BriefConfig,
    pub start_time: std::time::Instant,
    /// Run-cycle orchestrator behind the scheduled trigger.
    pub cycle: Arc<DispatchCycle>,
    /// Tasks, subscriptions and run logs.
    pub store: Arc<dyn BriefStore>,
    // Preview path talks to the content collaborators directly.
    pub news: Arc<dyn NewsSource>,
    pub summarizer: Arc<dyn Summarizer>,
    pub generator: Arc<dyn Generator>,
}

/// Secret check for the trigger. Validates the `x-scheduler-secret` header.
/// An unset secret rejects every request.
async fn require_scheduler_secret(
    State(state): State<Arc<AppState>>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let expected = state.config.scheduler.secret.as_str();
    let provided = req
        .headers()
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !expected.is_empty() && provided == expected {
        return next.run(req).await;
    }

    tracing::warn!("🔒 Rejected scheduled trigger: missing or invalid secret");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": "Unauthorized"})),
    )
        .into_response()
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    build_router_from_arc(Arc::new(state))
}

pub fn build_router_from_arc(shared: Arc<AppState>) -> Router {
    // Trigger: requires the scheduler secret
    let protected = Router::new()
        .route("/api/send-scheduled", post(super::routes::send_scheduled))
        .route_layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_scheduler_secret,
        ));

    let public = Router::new()
        .route("/health", get(super::routes::health_check))
        .route(
            "/api/tasks",
            get(super::routes::list_tasks).post(super::routes::create_task),
        )
        .route("/api/tasks/{id}/runs", get(super::routes::task_runs))
        .route("/api/subscribe", post(super::routes::subscribe))
        .route("/api/unsubscribe", get(super::routes::unsubscribe))
        .route("/api/preview", post(super::routes::preview));

    protected
        .merge(public)
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .max_age(std::time::Duration::from_secs(3600));
            // Example: NEWSBRIEF_CORS_ORIGINS=https://brief.example.com,https://app.example.com
            if let Ok(origins_str) = std::env::var("NEWSBRIEF_CORS_ORIGINS") {
                let origins: Vec<_> = origins_str
                    .split(',')
                    .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            } else {
                cors.allow_origin(Any)
            }
        })
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server.
pub async fn start(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port);
    if state.config.scheduler.secret.is_empty() {
        tracing::warn!("⚠️ scheduler.secret is not set — /api/send-scheduled will reject every call");
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
