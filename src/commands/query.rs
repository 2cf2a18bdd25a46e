use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::answer::{answer_question, Answer};
use crate::cli::QueryArgs;
use crate::index::load_index;
use crate::model::{CompletionOptions, IndexRecord, ScoredChunk};
use crate::provider::{select_provider, ModelProvider};
use crate::retrieval::retrieve_top_k;
use crate::util::{format_cost, format_similarity_score, preview};

const SOURCE_PREVIEW_CHARS: usize = 150;

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub rank: usize,
    pub id: String,
    pub filename: String,
    pub similarity_score: f64,
    pub preview: String,
}

impl SourceSummary {
    pub fn from_ranked(chunks: &[ScoredChunk], preview_chars: usize) -> Vec<Self> {
        chunks
            .iter()
            .enumerate()
            .map(|(position, chunk)| Self {
                rank: position + 1,
                id: chunk.record.id.clone(),
                filename: chunk.filename().to_string(),
                similarity_score: chunk.similarity_score,
                preview: preview(chunk.text(), preview_chars),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub question: String,
    pub sources: Vec<SourceSummary>,
    pub answer: Answer,
}

pub fn run(args: QueryArgs) -> Result<()> {
    let provider = select_provider(&args.provider)?;
    let index = load_index(&args.index_path)?;
    info!(
        index_path = %args.index_path.display(),
        records = index.len(),
        top_k = args.generation.top_k,
        chat_model = %provider.chat_model(),
        "query requested"
    );

    let response = answer_with_sources(
        provider.as_ref(),
        &index,
        &args.question,
        args.generation.top_k,
        args.generation.completion_options(),
    )?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &response)
            .context("failed to serialize query json output")?;
        writeln!(output)?;
    } else {
        write_response(&mut output, &response)?;
    }
    output.flush()?;
    Ok(())
}

pub fn answer_with_sources(
    provider: &dyn ModelProvider,
    index: &[IndexRecord],
    question: &str,
    top_k: usize,
    options: CompletionOptions,
) -> Result<QueryResponse> {
    let chunks = retrieve_top_k(provider, question, top_k, index)
        .with_context(|| format!("failed to retrieve context for: {question}"))?;
    if chunks.is_empty() {
        warn!("no indexed chunks available; answering without context");
    }

    let answer = answer_question(provider, question, &chunks, options)
        .context("failed to generate answer")?;

    Ok(QueryResponse {
        question: question.to_string(),
        sources: SourceSummary::from_ranked(&chunks, SOURCE_PREVIEW_CHARS),
        answer,
    })
}

pub fn write_response(output: &mut impl Write, response: &QueryResponse) -> Result<()> {
    writeln!(output, "Question: {}", response.question)?;
    writeln!(output)?;
    write_sources(output, &response.sources)?;
    writeln!(output)?;
    writeln!(output, "Answer:")?;
    writeln!(output, "{}", response.answer.text)?;
    writeln!(output)?;
    write_answer_stats(output, &response.answer)?;
    Ok(())
}

pub fn write_sources(output: &mut impl Write, sources: &[SourceSummary]) -> Result<()> {
    writeln!(output, "Sources: {}", sources.len())?;
    for source in sources {
        writeln!(
            output,
            "{}.\t{} ({} match)",
            source.rank,
            source.filename,
            format_similarity_score(source.similarity_score)
        )?;
        writeln!(output, "\t{}...", source.preview)?;
    }
    Ok(())
}

pub fn write_answer_stats(output: &mut impl Write, answer: &Answer) -> Result<()> {
    writeln!(
        output,
        "Tokens: {} input + {} output = {} total",
        answer.usage.prompt_tokens, answer.usage.completion_tokens, answer.usage.total_tokens
    )?;
    writeln!(output, "Model: {}", answer.model)?;
    writeln!(output, "Cost: {}", format_cost(answer.cost))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build_index;
    use crate::model::Document;
    use crate::provider::LocalProvider;
    use crate::semantic::ChunkingConfig;

    fn local_index(provider: &LocalProvider) -> Vec<IndexRecord> {
        let documents = vec![
            Document {
                filename: "employee-handbook.txt".to_string(),
                content: "Full-time employees receive 15 days of paid time off per year."
                    .to_string(),
            },
            Document {
                filename: "product-pricing.txt".to_string(),
                content: "CloudSync Pro costs $12 per user per month.".to_string(),
            },
        ];
        build_index(provider, &documents, ChunkingConfig::default(), 16).expect("index builds")
    }

    #[test]
    fn response_lists_ranked_sources_and_answer() {
        let provider = LocalProvider::new(256);
        let index = local_index(&provider);
        let response = answer_with_sources(
            &provider,
            &index,
            "How many days of paid time off do employees get?",
            1,
            CompletionOptions::default(),
        )
        .expect("query answers");

        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].rank, 1);
        assert_eq!(response.sources[0].filename, "employee-handbook.txt");
        assert!(response.answer.text.contains("[Source 1]"));
        assert_eq!(response.answer.cost, 0.0);
    }

    #[test]
    fn text_output_contains_sources_answer_and_cost() {
        let provider = LocalProvider::new(256);
        let index = local_index(&provider);
        let response = answer_with_sources(
            &provider,
            &index,
            "What does CloudSync Pro cost?",
            2,
            CompletionOptions::default(),
        )
        .expect("query answers");

        let mut buffer = Vec::<u8>::new();
        write_response(&mut buffer, &response).expect("write");
        let text = String::from_utf8(buffer).expect("utf8");
        assert!(text.contains("Sources: 2"));
        assert!(text.contains("1.\tproduct-pricing.txt ("));
        assert!(text.contains("Answer:"));
        assert!(text.contains("Cost: $0.000000"));
    }

    #[test]
    fn previews_are_truncated() {
        let chunk = ScoredChunk {
            record: IndexRecord {
                id: "a.txt-chunk-0".to_string(),
                filename: "a.txt".to_string(),
                text: "x".repeat(400),
                embedding: vec![1.0],
            },
            similarity_score: 0.5,
        };
        let sources = SourceSummary::from_ranked(&[chunk], SOURCE_PREVIEW_CHARS);
        assert_eq!(sources[0].preview.chars().count(), SOURCE_PREVIEW_CHARS);
    }
}
