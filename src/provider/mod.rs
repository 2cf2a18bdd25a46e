//! Model provider capability: text embeddings and chat completions.
//!
//! Every component that needs a model receives a `&dyn ModelProvider`
//! explicitly. The OpenAI client talks HTTP; the local provider is a
//! deterministic offline stand-in used for dry runs and tests.

mod local;
mod openai;
mod retry;

use std::time::Duration;

use crate::cli::{ProviderArgs, ProviderKind};
use crate::error::{ProviderError, RagError, Result};
use crate::model::{ChatMessage, Completion, CompletionOptions};

pub use local::LocalProvider;
pub use openai::OpenAiProvider;
pub use retry::{RetryPolicy, RetryingProvider};

pub trait ModelProvider: Send + Sync {
    fn embedding_model(&self) -> &str;

    fn chat_model(&self) -> &str;

    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;

    /// Embeds several texts, preserving input order. Providers with a native
    /// batch endpoint override this.
    fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> std::result::Result<Completion, ProviderError>;
}

impl<P: ModelProvider + ?Sized> ModelProvider for Box<P> {
    fn embedding_model(&self) -> &str {
        (**self).embedding_model()
    }

    fn chat_model(&self) -> &str {
        (**self).chat_model()
    }

    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        (**self).embed_batch(texts)
    }

    fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> std::result::Result<Completion, ProviderError> {
        (**self).complete(messages, options)
    }
}

pub fn select_provider(args: &ProviderArgs) -> Result<Box<dyn ModelProvider>> {
    let policy = RetryPolicy {
        max_retries: args.max_retries,
        base_delay: Duration::from_millis(args.retry_base_delay_ms),
        max_delay: Duration::from_millis(args.retry_max_delay_ms),
    };

    match args.provider {
        ProviderKind::Openai => {
            let api_key = args
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    RagError::Configuration(
                        ProviderError::MissingCredentials("openai".to_string()).to_string(),
                    )
                })?;
            let client = OpenAiProvider::new(
                &args.api_base,
                api_key,
                &args.embedding_model,
                &args.chat_model,
                args.timeout_ms,
            )?;
            Ok(Box::new(RetryingProvider::new(client, policy)))
        }
        ProviderKind::Local => Ok(Box::new(RetryingProvider::new(
            LocalProvider::new(args.local_embedding_dim),
            policy,
        ))),
    }
}
