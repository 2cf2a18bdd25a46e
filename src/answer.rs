use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::model::{ChatMessage, CompletionOptions, ScoredChunk, UsageStats};
use crate::provider::ModelProvider;

pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Use the provided context to answer the question. Always cite your sources using the [Source X] format provided in the context. If you use information from multiple sources, mention all relevant sources.";

const SOURCE_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// USD per 1000 tokens.
const PRICE_TABLE: &[(&str, ModelPricing)] = &[
    (
        "gpt-3.5-turbo",
        ModelPricing {
            input_per_1k: 0.0015,
            output_per_1k: 0.002,
        },
    ),
    (
        "gpt-4o-mini",
        ModelPricing {
            input_per_1k: 0.00015,
            output_per_1k: 0.0006,
        },
    ),
    (
        "text-embedding-3-small",
        ModelPricing {
            input_per_1k: 0.00002,
            output_per_1k: 0.0,
        },
    ),
];

pub fn model_pricing(model: &str) -> Option<ModelPricing> {
    PRICE_TABLE
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, pricing)| *pricing)
}

pub fn estimate_cost(usage: &UsageStats, model: &str) -> f64 {
    let Some(pricing) = model_pricing(model) else {
        return 0.0;
    };

    usage.prompt_tokens as f64 / 1000.0 * pricing.input_per_1k
        + usage.completion_tokens as f64 / 1000.0 * pricing.output_per_1k
}

pub fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| format!("[Source {}: {}]\n{}", index + 1, chunk.filename(), chunk.text()))
        .collect::<Vec<String>>()
        .join(SOURCE_SEPARATOR)
}

pub fn build_messages(question: &str, chunks: &[ScoredChunk]) -> Vec<ChatMessage> {
    let context = build_context(chunks);
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Context:\n{context}\n\nQuestion: {question}\n\nPlease provide a comprehensive answer and cite your sources."
        )),
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub model: String,
    pub usage: UsageStats,
    pub cost: f64,
}

/// Provider failures are returned as-is; nothing is retried here.
pub fn answer_question(
    provider: &dyn ModelProvider,
    question: &str,
    chunks: &[ScoredChunk],
    options: CompletionOptions,
) -> Result<Answer> {
    let messages = build_messages(question, chunks);
    let completion = provider.complete(&messages, options)?;
    let cost = estimate_cost(&completion.usage, &completion.model);

    info!(
        model = %completion.model,
        sources = chunks.len(),
        prompt_tokens = completion.usage.prompt_tokens,
        completion_tokens = completion.usage.completion_tokens,
        cost,
        "answer generated"
    );

    Ok(Answer {
        text: completion.text,
        model: completion.model,
        usage: completion.usage,
        cost,
    })
}
