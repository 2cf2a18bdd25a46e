use std::collections::HashSet;

use crate::error::ProviderError;
use crate::model::{ChatMessage, Completion, CompletionOptions, Role, UsageStats};
use crate::semantic::{content_words, embed_text_local, word_count};

use super::ModelProvider;

pub const LOCAL_EMBEDDING_MODEL: &str = "local-hash-v1";
pub const LOCAL_CHAT_MODEL: &str = "local-extractive";

const NO_ANSWER: &str = "The provided sources do not contain an answer to this question.";

/// Offline provider: hashed bag-of-words embeddings and extractive answers.
///
/// Answers quote, for every `[Source i: file]` block in the prompt, the
/// sentence sharing the most words with the question.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    dimensions: usize,
}

impl LocalProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }
}

impl ModelProvider for LocalProvider {
    fn embedding_model(&self) -> &str {
        LOCAL_EMBEDDING_MODEL
    }

    fn chat_model(&self) -> &str {
        LOCAL_CHAT_MODEL
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(embed_text_local(text, self.dimensions))
    }

    fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let prompt = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
            .ok_or_else(|| ProviderError::Malformed("no user message in request".to_string()))?;

        let (context, question) = split_prompt(prompt);
        let question_words = content_words(question)
            .into_iter()
            .collect::<HashSet<String>>();

        let mut cited = Vec::<String>::new();
        for (citation, body) in source_blocks(context) {
            if let Some(sentence) = best_sentence(body, &question_words) {
                cited.push(format!("{sentence} [Source {citation}]"));
            }
        }

        let mut text = if cited.is_empty() {
            NO_ANSWER.to_string()
        } else {
            cited.join(" ")
        };
        let limit = options.max_tokens as usize;
        if word_count(&text) > limit {
            text = text
                .split_whitespace()
                .take(limit)
                .collect::<Vec<&str>>()
                .join(" ");
        }

        let prompt_tokens = messages
            .iter()
            .map(|message| word_count(&message.content) as u64)
            .sum::<u64>();
        let usage = UsageStats::new(prompt_tokens, word_count(&text) as u64);

        Ok(Completion {
            text,
            usage,
            model: LOCAL_CHAT_MODEL.to_string(),
        })
    }
}

fn split_prompt(prompt: &str) -> (&str, &str) {
    let body = prompt.strip_prefix("Context:\n").unwrap_or(prompt);
    match body.rfind("\n\nQuestion: ") {
        Some(position) => {
            let context = &body[..position];
            let rest = &body[position + "\n\nQuestion: ".len()..];
            let question = rest.split("\n\n").next().unwrap_or(rest);
            (context, question)
        }
        None => ("", body),
    }
}

fn source_blocks(context: &str) -> Vec<(usize, &str)> {
    let mut blocks = Vec::new();
    for block in context.split("\n\n---\n\n") {
        let Some((header, body)) = block.split_once('\n') else {
            continue;
        };
        let Some(label) = header
            .strip_prefix("[Source ")
            .and_then(|rest| rest.split(':').next())
        else {
            continue;
        };
        if let Ok(citation) = label.trim().parse::<usize>() {
            blocks.push((citation, body));
        }
    }
    blocks
}

fn best_sentence<'a>(body: &'a str, question_words: &HashSet<String>) -> Option<&'a str> {
    let mut best: Option<(&str, usize)> = None;
    for sentence in body.split_inclusive(['.', '!', '?']) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        let overlap = content_words(sentence)
            .into_iter()
            .collect::<HashSet<String>>()
            .intersection(question_words)
            .count();
        if overlap == 0 {
            continue;
        }

        // first sentence wins ties
        if best.is_none_or(|(_, best_overlap)| overlap > best_overlap) {
            best = Some((sentence, overlap));
        }
    }
    best.map(|(sentence, _)| sentence)
}
