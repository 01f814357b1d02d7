//! HTTP routes for the task queue service.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{TaskQueue, TaskResponse};
use crate::config::QueueConfig;
use crate::error::ConfigError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<TaskQueue>,
}

/// Build the Axum router for the queue service.
pub fn queue_routes(queue: Arc<TaskQueue>) -> Router {
    let state = AppState { queue };

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/add_task", post(add_task))
        .route("/get_task", get(get_task))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    config: &QueueConfig,
    queue: Arc<TaskQueue>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ConfigError> {
    let listener = TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, "Task queue server started");
    axum::serve(listener, queue_routes(queue))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Task queue server stopped");
    Ok(())
}

// ── Diagnostics ─────────────────────────────────────────────────────────

async fn index(State(state): State<AppState>) -> String {
    format!(
        "MCP Server is running. Tasks in queue: {}",
        state.queue.status().await
    )
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "cortex-queue",
        "depth": state.queue.status().await,
    }))
}

// ── Tasks ───────────────────────────────────────────────────────────────

fn bad_request() -> (StatusCode, Json<TaskResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(TaskResponse::Error {
            message: "Invalid request".to_string(),
        }),
    )
}

/// Pull the plan text out of an `add_task` body. A list is accepted and kept
/// as its serialized text.
fn extract_commands(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get("commands")? {
        Value::String(s) => Some(s.clone()),
        list @ Value::Array(_) => Some(list.to_string()),
        _ => None,
    }
}

async fn add_task(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<TaskResponse>) {
    let Some(commands) = extract_commands(&body) else {
        warn!("Rejected add_task: missing or invalid 'commands'");
        return bad_request();
    };

    match state.queue.enqueue(commands).await {
        Ok(_) => (
            StatusCode::OK,
            Json(TaskResponse::Success {
                message: Some("Task added.".to_string()),
            }),
        ),
        Err(e) => {
            warn!(error = %e, "Rejected add_task");
            bad_request()
        }
    }
}

async fn get_task(State(state): State<AppState>) -> Json<TaskResponse> {
    match state.queue.dequeue().await {
        Some(commands) => Json(TaskResponse::NewTask { commands }),
        None => Json(TaskResponse::NoTask),
    }
}
