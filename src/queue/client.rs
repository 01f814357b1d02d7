//! HTTP client for the task queue service, used by the controller (producer),
//! the executor (consumer) and the `submit` command.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::TaskResponse;
use crate::error::QueueError;

/// Default per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of polling the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPoll {
    NoTask,
    NewTask(String),
}

/// Talks to a running queue server.
#[derive(Debug, Clone)]
pub struct QueueClient {
    http: reqwest::Client,
    base_url: String,
    /// Applied to every request.
    timeout: Duration,
}

impl QueueClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn unreachable(&self, e: reqwest::Error) -> QueueError {
        QueueError::Unreachable {
            url: self.base_url.clone(),
            reason: e.to_string(),
        }
    }

    /// Enqueue raw plan text.
    pub async fn add_task(&self, plan: &str) -> Result<(), QueueError> {
        if plan.trim().is_empty() {
            return Err(QueueError::EmptyPayload);
        }

        let response = self
            .http
            .post(self.url("/add_task"))
            .timeout(self.timeout)
            .json(&serde_json::json!({ "commands": plan }))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if status.is_success() {
            debug!("Plan sent to queue");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or(text);
        Err(QueueError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    /// Poll for the next task. Never waits server-side.
    pub async fn get_task(&self) -> Result<TaskPoll, QueueError> {
        let response = self
            .http
            .get(self.url("/get_task"))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueueError::Rejected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: TaskResponse = response
            .json()
            .await
            .map_err(|e| QueueError::InvalidResponse(e.to_string()))?;

        match body {
            TaskResponse::NoTask => Ok(TaskPoll::NoTask),
            TaskResponse::NewTask { commands } => Ok(TaskPoll::NewTask(commands)),
            other => Err(QueueError::InvalidResponse(format!(
                "unexpected get_task body: {other:?}"
            ))),
        }
    }

    /// Liveness string from the server, including queue depth.
    pub async fn status(&self) -> Result<String, QueueError> {
        let response = self
            .http
            .get(self.url("/"))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        response
            .text()
            .await
            .map_err(|e| QueueError::InvalidResponse(e.to_string()))
    }
}
