use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::ProviderError;
use crate::model::{ChatMessage, Completion, CompletionOptions};

use super::ModelProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: ModelProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn with_retry<T>(
        &self,
        operation: &str,
        mut call: impl FnMut(&P) -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let mut attempt = 0u32;
        loop {
            match call(&self.inner) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient provider failure; retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<P: ModelProvider> ModelProvider for RetryingProvider<P> {
    fn embedding_model(&self) -> &str {
        self.inner.embedding_model()
    }

    fn chat_model(&self) -> &str {
        self.inner.chat_model()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.with_retry("embed", |inner| inner.embed(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.with_retry("embed_batch", |inner| inner.embed_batch(texts))
    }

    fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        self.with_retry("complete", |inner| inner.complete(messages, options))
    }
}
