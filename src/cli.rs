use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::CompletionOptions;
use crate::retrieval::DEFAULT_TOP_K;
use crate::semantic::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_LOCAL_EMBEDDING_DIM};

#[derive(Parser, Debug)]
#[command(
    name = "docqa",
    version,
    about = "Question answering over a folder of text documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk and embed the corpus into a JSON index.
    Index(IndexArgs),
    /// Answer one question from the index.
    Query(QueryArgs),
    /// Show the most similar chunks without generating an answer.
    Search(SearchArgs),
    /// Run the test suite and write an evaluation report.
    Evaluate(EvaluateArgs),
    /// Interactive question loop.
    Chat(ChatArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ProviderKind {
    Openai,
    Local,
}

#[derive(Args, Debug, Clone)]
pub struct ProviderArgs {
    #[arg(long, value_enum, default_value_t = ProviderKind::Openai)]
    pub provider: ProviderKind,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_BASE", default_value = "https://api.openai.com/v1")]
    pub api_base: String,

    #[arg(long, default_value = "text-embedding-3-small")]
    pub embedding_model: String,

    #[arg(long, default_value = "gpt-3.5-turbo")]
    pub chat_model: String,

    #[arg(long, default_value_t = 30_000)]
    pub timeout_ms: u64,

    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    #[arg(long, default_value_t = 500)]
    pub retry_base_delay_ms: u64,

    #[arg(long, default_value_t = 8_000)]
    pub retry_max_delay_ms: u64,

    #[arg(long, default_value_t = DEFAULT_LOCAL_EMBEDDING_DIM)]
    pub local_embedding_dim: usize,
}

#[derive(Args, Debug, Clone)]
pub struct GenerationArgs {
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    #[arg(long, default_value_t = 800)]
    pub max_tokens: u32,

    #[arg(long, default_value_t = 0.7)]
    pub temperature: f32,
}

impl GenerationArgs {
    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[arg(long, default_value = "knowledge-base")]
    pub corpus_dir: PathBuf,

    #[arg(long, default_value = "knowledge-base-index.json")]
    pub index_path: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[arg(long, default_value = "knowledge-base-index.json")]
    pub index_path: PathBuf,

    #[arg(long)]
    pub question: String,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub generation: GenerationArgs,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    #[arg(long, default_value = "knowledge-base-index.json")]
    pub index_path: PathBuf,

    #[arg(long)]
    pub query: String,

    #[arg(long, default_value_t = 5)]
    pub limit: usize,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[arg(long, default_value = "knowledge-base-index.json")]
    pub index_path: PathBuf,

    #[arg(long)]
    pub cases: Option<PathBuf>,

    #[arg(long, default_value = "evaluation-report.json")]
    pub report_path: PathBuf,

    #[command(flatten)]
    pub generation: GenerationArgs,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    #[arg(long, default_value = "knowledge-base")]
    pub corpus_dir: PathBuf,

    #[arg(long, default_value = "knowledge-base-index.json")]
    pub index_path: PathBuf,

    #[command(flatten)]
    pub generation: GenerationArgs,

    #[command(flatten)]
    pub provider: ProviderArgs,
}
