//! Planner: asks the LLM to turn an utterance into a JSON action plan.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, RetryPolicy, complete_with_retry};

/// Plan text returned whenever the backend cannot produce one.
pub const EMPTY_PLAN: &str = "[]";

/// Plans should be reproducible, not creative.
pub const PLAN_TEMPERATURE: f32 = 0.1;

/// Fixed instruction describing the capability registry and output shape.
pub const SYSTEM_PROMPT: &str = r#"You are a helpful desktop assistant. Your job is to translate a user's natural language command into a structured JSON format. You have access to a specific set of tools. You must respond ONLY with a JSON list of commands, each of the form {"tool": "<name>", "parameters": {...}}.

Available Tools:
1. "open_application": Use this to open any application. Parameters: {"app_name": "<executable name>"} (e.g., "notepad.exe", "chrome.exe").
2. "write_text": Use this to type text. Parameters: {"text_to_write": "<text>"}. Use "\n" for the enter key.

If you cannot determine an action, or if the user is just chatting, respond with an empty list []."#;

/// Build the user prompt from retrieved context and the new request.
pub fn build_prompt(user_input: &str, context: &[String]) -> String {
    format!(
        "Here is some relevant context from our past conversation:\n{}\n\n\
         Based on this context, please create a JSON plan for the following user request:\n'{}'",
        context.join("\n"),
        user_input
    )
}

/// Produces candidate plan text for an utterance.
pub struct Planner {
    llm: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Ask the LLM for a plan. Never fails: backend errors yield `"[]"`.
    pub async fn get_plan(&self, user_input: &str, context: &[String]) -> String {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(user_input, context)),
        ])
        .with_temperature(PLAN_TEMPERATURE);

        debug!(context_docs = context.len(), "Briefing planner");

        match complete_with_retry(self.llm.as_ref(), request, self.retry).await {
            Ok(response) => {
                let plan = response.content.trim().to_string();
                info!(
                    model = self.llm.model_name(),
                    output_tokens = response.output_tokens,
                    plan = %plan,
                    "Planner responded"
                );
                plan
            }
            Err(e) => {
                error!(error = %e, "Planner could not reach the LLM, using empty plan");
                EMPTY_PLAN.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{CompletionResponse, FinishReason, Role};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Records the last request and replies with a canned answer.
    struct Canned {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmProvider for Canned {
        fn model_name(&self) -> &str {
            "canned"
        }
        async fn complete(&self, r: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(r);
            Ok(CompletionResponse {
                content: self.reply.clone(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    struct Down {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for Down {
        fn model_name(&self) -> &str {
            "down"
        }
        async fn complete(&self, _r: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::RequestFailed {
                provider: "down".into(),
                reason: "connection refused".into(),
            })
        }
    }

    #[test]
    fn prompt_carries_context_and_request() {
        let prompt = build_prompt(
            "open notepad",
            &["User asked: 'a'.".to_string(), "User asked: 'b'.".to_string()],
        );
        assert!(prompt.contains("User asked: 'a'.\nUser asked: 'b'."));
        assert!(prompt.ends_with("'open notepad'"));
    }

    #[tokio::test]
    async fn returns_trimmed_llm_text() {
        let llm = Arc::new(Canned {
            reply: "  [{\"tool\":\"write_text\",\"parameters\":{\"text_to_write\":\"hi\"}}]\n"
                .into(),
            seen: Mutex::new(Vec::new()),
        });
        let planner = Planner::new(llm.clone());
        let plan = planner.get_plan("type hi", &[]).await;
        assert!(plan.starts_with('[') && plan.ends_with(']'));

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].messages[0].role, Role::System);
        assert_eq!(seen[0].messages[0].content, SYSTEM_PROMPT);
        assert!(seen[0].messages[1].content.contains("'type hi'"));
        assert_eq!(seen[0].temperature, Some(PLAN_TEMPERATURE));
    }

    #[tokio::test]
    async fn backend_failure_maps_to_empty_plan_after_one_retry() {
        let llm = Arc::new(Down {
            calls: AtomicU32::new(0),
        });
        let planner = Planner::new(llm.clone()).with_retry(RetryPolicy {
            timeout: Duration::from_secs(1),
            max_attempts: 2,
        });
        assert_eq!(planner.get_plan("open notepad", &[]).await, EMPTY_PLAN);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }
}
