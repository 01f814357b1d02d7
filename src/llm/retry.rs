//! Bounded-time completion with a fixed number of attempts.

use std::time::Duration;

use tracing::warn;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Timeout and attempt budget for a single logical completion.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Upper bound on each attempt.
    pub timeout: Duration,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_attempts: 2,
        }
    }
}

/// Run `request` against `llm`, retrying on any error or timeout until the
/// attempt budget is spent. Returns the last error.
pub async fn complete_with_retry(
    llm: &dyn LlmProvider,
    request: CompletionRequest,
    policy: RetryPolicy,
) -> Result<CompletionResponse, LlmError> {
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        let result = match tokio::time::timeout(policy.timeout, llm.complete(request.clone())).await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                provider: llm.model_name().to_string(),
                timeout: policy.timeout,
            }),
        };

        match result {
            Ok(response) => return Ok(response),
            Err(e) => {
                warn!(attempt, max_attempts = attempts, error = %e, "LLM call failed");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| LlmError::RequestFailed {
        provider: llm.model_name().to_string(),
        reason: "no attempts made".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::{ChatMessage, FinishReason};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `fail_first` calls, then succeeds.
    struct Flaky {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl LlmProvider for Flaky {
        fn model_name(&self) -> &str {
            "flaky"
        }
        async fn complete(&self, _r: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(LlmError::RequestFailed {
                    provider: "flaky".into(),
                    reason: "boom".into(),
                });
            }
            Ok(CompletionResponse {
                content: "ok".into(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    struct Hangs;

    #[async_trait]
    impl LlmProvider for Hangs {
        fn model_name(&self) -> &str {
            "hangs"
        }
        async fn complete(&self, _r: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn single_retry_recovers_from_one_failure() {
        let llm = Flaky {
            calls: AtomicU32::new(0),
            fail_first: 1,
        };
        let out = complete_with_retry(&llm, request(), RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(out.content, "ok");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let llm = Flaky {
            calls: AtomicU32::new(0),
            fail_first: 10,
        };
        let err = complete_with_retry(&llm, request(), RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed { .. }));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(20),
            max_attempts: 2,
        };
        let err = complete_with_retry(&Hangs, request(), policy)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout { .. }));
    }
}
