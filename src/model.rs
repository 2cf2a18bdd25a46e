use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source_filename: String,
    pub sequence_index: usize,
    pub text: String,
}

impl Chunk {
    pub fn record_id(&self) -> String {
        format!("{}-chunk-{}", self.source_filename, self.sequence_index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub filename: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    #[serde(flatten)]
    pub record: IndexRecord,
    #[serde(rename = "similarityScore")]
    pub similarity_score: f64,
}

impl ScoredChunk {
    pub fn filename(&self) -> &str {
        &self.record.filename
    }

    pub fn text(&self) -> &str {
        &self.record.text
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageStats {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 800,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: UsageStats,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub index_path: String,
    pub corpus_dir: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub document_count: usize,
    pub chunk_count: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub index_sha256: String,
    pub duration_ms: u128,
}
