use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
pub const DEFAULT_LOCAL_EMBEDDING_DIM: usize = 384;

/// Word-window chunking parameters. Construction enforces `size > overlap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    size: usize,
    overlap: usize,
}

impl ChunkingConfig {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(RagError::Configuration(
                "chunk size must be at least one word".to_string(),
            ));
        }
        if overlap >= size {
            return Err(RagError::Configuration(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({size})"
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(self) -> usize {
        self.size
    }

    pub fn overlap(self) -> usize {
        self.overlap
    }

    fn step(self) -> usize {
        self.size - self.overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Windows start at word 0 and advance by `size - overlap`. The window that
/// reaches the last word is the final one, so a text of at most `size` words
/// yields exactly one chunk.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let words = text.split_whitespace().collect::<Vec<&str>>();
    let mut chunks = Vec::<String>::new();

    let mut start = 0usize;
    while start < words.len() {
        let end = (start + config.size()).min(words.len());
        let chunk = words[start..end].join(" ");
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if end == words.len() {
            break;
        }
        start += config.step();
    }

    chunks
}

pub fn word_count(input: &str) -> usize {
    input.split_whitespace().count()
}

/// Returns 0.0 when the lengths differ, either side is empty, or either side
/// has zero magnitude. Callers that must reject mismatched dimensions check
/// lengths before calling.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut left_norm = 0.0_f64;
    let mut right_norm = 0.0_f64;
    for (left_value, right_value) in left.iter().zip(right.iter()) {
        let left_value = f64::from(*left_value);
        let right_value = f64::from(*right_value);
        dot += left_value * right_value;
        left_norm += left_value * left_value;
        right_norm += right_value * right_value;
    }

    if left_norm <= 0.0 || right_norm <= 0.0 {
        return 0.0;
    }

    dot / (left_norm.sqrt() * right_norm.sqrt())
}

/// Feature-hashing embedder over words and word bigrams, L2-normalized.
pub fn embed_text_local(payload: &str, dimensions: usize) -> Vec<f32> {
    let dims = dimensions.max(8);
    let mut vector = vec![0_f32; dims];
    let tokens = tokenize_payload(payload);

    if tokens.is_empty() {
        return vector;
    }

    for token in &tokens {
        let hash = stable_hash(token);
        let index = (hash % dims as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        let weight = 1.0 + (((hash >> 48) & 0xFF) as f32 / 255.0);
        vector[index] += sign * weight;
    }

    normalize_vector(&mut vector);
    vector
}

pub fn content_words(payload: &str) -> Vec<String> {
    payload
        .split_whitespace()
        .map(|value| {
            value
                .chars()
                .filter(|character| character.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|value| !value.is_empty())
        .collect()
}

fn stable_hash(value: &str) -> u64 {
    let digest = Sha256::digest(value.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn tokenize_payload(payload: &str) -> Vec<String> {
    let words = content_words(payload);
    if words.is_empty() {
        return Vec::new();
    }

    let mut features = Vec::<String>::with_capacity(words.len() * 2);
    for (index, word) in words.iter().enumerate() {
        features.push(format!("w:{word}"));
        if let Some(next) = words.get(index + 1) {
            features.push(format!("b:{word}_{next}"));
        }
    }
    features
}

fn normalize_vector(values: &mut [f32]) {
    let squared_norm = values
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>();

    if squared_norm <= 0.0 {
        return;
    }

    let norm = squared_norm.sqrt() as f32;
    for value in values {
        *value /= norm;
    }
}
