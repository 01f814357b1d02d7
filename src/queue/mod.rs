//! Task queue: a single in-memory FIFO of plan texts behind an HTTP boundary.
//!
//! The queue is the only shared mutable state in the pipeline. Producers and
//! consumers never touch it directly; they go through the routes in
//! [`server`] (or [`client::QueueClient`] on the calling side).

pub mod client;
pub mod server;

pub use client::{QueueClient, TaskPoll};
pub use server::queue_routes;

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::QueueError;

/// Wire body of a task poll or an add acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskResponse {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        message: String,
    },
    NoTask,
    NewTask {
        commands: String,
    },
}

/// In-memory FIFO. Every operation takes the lock once, so each request
/// observes a fully settled queue.
pub struct TaskQueue {
    tasks: Mutex<VecDeque<String>>,
}

impl TaskQueue {
    /// Create a new, empty queue.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(VecDeque::new()),
        })
    }

    /// Append a plan text at the tail. Returns the new depth.
    pub async fn enqueue(&self, plan: String) -> Result<usize, QueueError> {
        if plan.trim().is_empty() {
            return Err(QueueError::EmptyPayload);
        }
        let depth = {
            let mut tasks = self.tasks.lock().await;
            tasks.push_back(plan);
            tasks.len()
        };
        info!(depth, "Task added");
        Ok(depth)
    }

    /// Pop the head, or `None` when there is no work. Never waits.
    pub async fn dequeue(&self) -> Option<String> {
        let (task, depth) = {
            let mut tasks = self.tasks.lock().await;
            let task = tasks.pop_front();
            (task, tasks.len())
        };
        if task.is_some() {
            info!(depth, "Task dispatched");
        }
        task
    }

    /// Current depth.
    pub async fn status(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"[{"tool":"open_application","parameters":{"app_name":"notepad.exe"}}]"#;

    #[tokio::test]
    async fn enqueue_then_dequeue_preserves_content() {
        let queue = TaskQueue::new();
        assert_eq!(queue.enqueue(PLAN.to_string()).await.unwrap(), 1);
        assert_eq!(queue.dequeue().await.as_deref(), Some(PLAN));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn dequeues_in_enqueue_order() {
        let queue = TaskQueue::new();
        for i in 0..5 {
            queue.enqueue(format!("plan-{i}")).await.unwrap();
        }
        assert_eq!(queue.status().await, 5);
        for i in 0..5 {
            assert_eq!(queue.dequeue().await, Some(format!("plan-{i}")));
        }
    }

    #[tokio::test]
    async fn empty_dequeue_is_idempotent() {
        let queue = TaskQueue::new();
        for _ in 0..3 {
            assert!(queue.dequeue().await.is_none());
        }
        queue.enqueue("x".into()).await.unwrap();
        assert_eq!(queue.dequeue().await.as_deref(), Some("x"));
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn rejects_blank_payload() {
        let queue = TaskQueue::new();
        assert!(matches!(
            queue.enqueue("   ".into()).await,
            Err(QueueError::EmptyPayload)
        ));
        assert_eq!(queue.status().await, 0);
    }

    #[tokio::test]
    async fn concurrent_dequeues_never_duplicate() {
        let queue = TaskQueue::new();
        for i in 0..200 {
            queue.enqueue(format!("plan-{i}")).await.unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    let mut got = Vec::new();
                    while let Some(task) = queue.dequeue().await {
                        got.push(task);
                    }
                    got
                })
            })
            .collect();

        let mut all = Vec::new();
        for result in futures::future::join_all(handles).await {
            all.extend(result.unwrap());
        }
        assert_eq!(all.len(), 200);
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 200, "a task was delivered twice");
    }

    #[test]
    fn wire_shapes() {
        let json = serde_json::to_value(TaskResponse::NoTask).unwrap();
        assert_eq!(json, serde_json::json!({"status": "no_task"}));

        let json = serde_json::to_value(TaskResponse::NewTask {
            commands: "[]".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"status": "new_task", "commands": "[]"}));

        let parsed: TaskResponse = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert_eq!(parsed, TaskResponse::Success { message: None });
    }
}
