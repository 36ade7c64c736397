//! Retry of LLM calls that fail before producing any output.

use std::sync::Arc;
use std::time::Duration;

use appforge_core::config::EngineConfig;
use appforge_core::{ForgeError, Result};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use tracing::warn;

use crate::llm::{LlmClient, LlmRequest, LlmStream};

/// Exponential backoff: `backoff`, `2 * backoff`, `4 * backoff`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.llm_max_attempts.max(1),
            backoff: Duration::from_millis(config.llm_backoff_ms),
        }
    }

    /// Delay before attempt `attempt + 1` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    pub fn should_retry(&self, err: &ForgeError, attempt: u32) -> bool {
        attempt < self.max_attempts && err.is_retryable()
    }
}

/// Wraps a client and retries retryable failures that happen before the first chunk.
///
/// Once any chunk has been delivered the stream is passed through untouched, so
/// callers never observe duplicated output.
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    policy: RetryPolicy,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn stream(&self, request: LlmRequest) -> Result<LlmStream> {
        let mut attempt = 1;
        loop {
            let err = match self.inner.stream(request.clone()).await {
                Ok(mut inner) => match inner.next().await {
                    Some(Ok(first)) => {
                        let head = stream::once(async move { Ok(first) });
                        return Ok(Box::pin(head.chain(inner)));
                    }
                    None => return Ok(Box::pin(stream::empty())),
                    Some(Err(e)) => e,
                },
                Err(e) => e,
            };

            if !self.policy.should_retry(&err, attempt) {
                return Err(err);
            }
            let delay = self.policy.delay_for(attempt);
            warn!(
                client = self.inner.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "[LLM] Retrying after failure"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
