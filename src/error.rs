//! Error types for Cortex.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// Errors talking to the task queue service.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue server unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("Queue server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response from queue server: {0}")]
    InvalidResponse(String),

    #[error("Task payload is empty")]
    EmptyPayload,
}

impl QueueError {
    /// Whether the failure was a transport problem (server down, connection reset).
    pub fn is_transport(&self) -> bool {
        matches!(self, QueueError::Unreachable { .. })
    }
}

/// Plan parsing and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Plan is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Plan is not a list of steps")]
    NotASequence,

    #[error("Step {index} is malformed: {reason}")]
    MalformedStep { index: usize, reason: String },

    #[error("Step {index} names unknown tool '{tool}'")]
    UnknownTool { index: usize, tool: String },
}

/// Desktop tool execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool {name} execution failed: {reason}")]
    ExecutionFailed { name: String, reason: String },

    #[error("Tool {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },
}

/// Plan memory / similarity store errors.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Failed to open memory store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_flagged() {
        let down = QueueError::Unreachable {
            url: "http://127.0.0.1:5000".into(),
            reason: "connection refused".into(),
        };
        assert!(down.is_transport());
        assert!(!QueueError::EmptyPayload.is_transport());
        assert!(
            !QueueError::Rejected {
                status: 400,
                message: "Invalid request".into()
            }
            .is_transport()
        );
    }

    #[test]
    fn plan_errors_convert_into_top_level() {
        let err: Error = PlanError::NotASequence.into();
        assert!(matches!(err, Error::Plan(PlanError::NotASequence)));
        assert_eq!(
            err.to_string(),
            "Plan error: Plan is not a list of steps"
        );
    }
}
