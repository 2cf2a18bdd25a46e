use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProviderError, RagError, Result};
use crate::model::{ChatMessage, Completion, CompletionOptions, UsageStats};

use super::ModelProvider;

pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    embedding_model: String,
    chat_model: String,
    timeout_ms: u64,
    http: Client,
}

impl OpenAiProvider {
    pub fn new(
        base_url: &str,
        api_key: &str,
        embedding_model: &str,
        chat_model: &str,
        timeout_ms: u64,
    ) -> Result<Self> {
        let mut builder = Client::builder();
        if timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let http = builder.build().map_err(|err| {
            RagError::Configuration(format!("failed to construct HTTP client: {err}"))
        })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            embedding_model: embedding_model.to_string(),
            chat_model: chat_model.to_string(),
            timeout_ms,
            http,
        })
    }

    fn post_json<T: Serialize>(
        &self,
        endpoint: &str,
        payload: &T,
    ) -> std::result::Result<String, ProviderError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .map_err(|err| self.classify(err))?;

        let status = response.status();
        let body = response.text().map_err(|err| self.classify(err))?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(endpoint, bytes = body.len(), "provider response received");
        Ok(body)
    }

    fn classify(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                timeout_ms: self.timeout_ms,
            }
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: Option<u64>,
}

pub(super) fn parse_embedding_response(
    body: &str,
    expected: usize,
) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
    let mut parsed: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|err| ProviderError::Malformed(format!("embedding response: {err}")))?;

    if parsed.data.len() != expected {
        return Err(ProviderError::Malformed(format!(
            "expected {expected} embeddings, received {}",
            parsed.data.len()
        )));
    }

    parsed.data.sort_by_key(|datum| datum.index);
    let mut out = Vec::<Vec<f32>>::with_capacity(expected);
    for datum in parsed.data {
        if datum.embedding.is_empty() {
            return Err(ProviderError::Malformed(format!(
                "embedding {} is empty",
                datum.index
            )));
        }
        out.push(datum.embedding);
    }
    Ok(out)
}

pub(super) fn parse_chat_response(
    body: &str,
    model: &str,
) -> std::result::Result<Completion, ProviderError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|err| ProviderError::Malformed(format!("chat response: {err}")))?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::Malformed("chat response has no content".to_string()))?;

    let usage = parsed
        .usage
        .map(|usage| UsageStats {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage
                .total_tokens
                .unwrap_or(usage.prompt_tokens + usage.completion_tokens),
        })
        .unwrap_or_default();

    Ok(Completion {
        text,
        usage,
        model: model.to_string(),
    })
}

impl ModelProvider for OpenAiProvider {
    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    fn chat_model(&self) -> &str {
        &self.chat_model
    }

    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::Malformed("embedding response was empty".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let payload = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let body = self.post_json("embeddings", &payload)?;
        parse_embedding_response(&body, texts.len())
    }

    fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> std::result::Result<Completion, ProviderError> {
        let payload = ChatRequest {
            model: &self.chat_model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        let body = self.post_json("chat/completions", &payload)?;
        parse_chat_response(&body, &self.chat_model)
    }
}
