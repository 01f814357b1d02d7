//! LLM integration for Cortex.
//!
//! Supports:
//! - **Ollama**: local daemon, `/api/chat`
//! - **Anthropic**: Messages API
//!
//! Both speak plain HTTP through a shared `reqwest::Client` and are exposed
//! behind the `LlmProvider` trait so the planner never sees the backend.

mod anthropic;
mod ollama;
pub mod provider;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use provider::*;
pub use retry::{RetryPolicy, complete_with_retry};

use std::sync::Arc;
use std::time::Duration;

use crate::config::env_or;
use crate::error::{ConfigError, LlmError};

/// Default Ollama daemon address.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default Ollama model.
pub const DEFAULT_OLLAMA_MODEL: &str = "gemma:7b";

/// Default Anthropic model.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Ollama,
    Anthropic,
}

impl std::str::FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(LlmBackend::Ollama),
            "anthropic" => Ok(LlmBackend::Anthropic),
            other => Err(ConfigError::InvalidValue {
                key: "CORTEX_LLM_BACKEND".to_string(),
                message: format!("unknown backend '{other}' (expected ollama or anthropic)"),
            }),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub model: String,
    /// Ollama base URL (ignored by other backends).
    pub base_url: String,
    /// Anthropic API key (required for that backend).
    pub api_key: Option<secrecy::SecretString>,
    /// Timeout and retry budget applied by the planner.
    pub retry: RetryPolicy,
}

impl LlmConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend: LlmBackend = std::env::var("CORTEX_LLM_BACKEND")
            .unwrap_or_else(|_| "ollama".to_string())
            .parse()?;

        let default_model = match backend {
            LlmBackend::Ollama => DEFAULT_OLLAMA_MODEL,
            LlmBackend::Anthropic => DEFAULT_ANTHROPIC_MODEL,
        };

        let defaults = RetryPolicy::default();
        Ok(Self {
            backend,
            model: std::env::var("CORTEX_MODEL").unwrap_or_else(|_| default_model.to_string()),
            base_url: std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string()),
            api_key: std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .map(secrecy::SecretString::from),
            retry: RetryPolicy {
                timeout: Duration::from_secs(env_or(
                    "CORTEX_LLM_TIMEOUT_SECS",
                    defaults.timeout.as_secs(),
                )),
                max_attempts: defaults.max_attempts,
            },
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| LlmError::RequestFailed {
            provider: format!("{:?}", config.backend).to_lowercase(),
            reason: format!("Failed to build HTTP client: {e}"),
        })?;

    match config.backend {
        LlmBackend::Ollama => {
            tracing::info!("Using Ollama at {} (model: {})", config.base_url, config.model);
            Ok(Arc::new(OllamaProvider::new(
                client,
                config.base_url.clone(),
                config.model.clone(),
            )))
        }
        LlmBackend::Anthropic => {
            let api_key = config.api_key.clone().ok_or_else(|| LlmError::AuthFailed {
                provider: "anthropic".to_string(),
            })?;
            tracing::info!("Using Anthropic (model: {})", config.model);
            Ok(Arc::new(AnthropicProvider::new(
                client,
                api_key,
                config.model.clone(),
            )))
        }
    }
}
