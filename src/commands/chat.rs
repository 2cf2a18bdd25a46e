use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::ChatArgs;
use crate::corpus::{load_corpus, read_document};
use crate::index::load_index;
use crate::model::{CompletionOptions, IndexRecord};
use crate::provider::{select_provider, ModelProvider};
use crate::semantic::word_count;
use crate::util::{format_cost, preview};

use super::query::{answer_with_sources, write_response};

const DOCUMENT_PREVIEW_CHARS: usize = 100;
const RULE: &str = "==================================================";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Exit,
    Stats,
    ViewSources,
    View(String),
    Empty,
    Question(String),
}

impl SessionCommand {
    /// Keywords match case-insensitively; document names and questions keep
    /// their original case.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }

        let lower = trimmed.to_lowercase();
        match lower.as_str() {
            "exit" => return Self::Exit,
            "stats" => return Self::Stats,
            "view sources" => return Self::ViewSources,
            _ => {}
        }

        match trimmed.get(..5) {
            Some(prefix) if prefix.eq_ignore_ascii_case("view ") => {
                Self::View(trimmed[5..].trim().to_string())
            }
            _ => Self::Question(trimmed.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionStats {
    queries: usize,
    total_cost: f64,
}

impl SessionStats {
    pub fn record(self, cost: f64) -> Self {
        Self {
            queries: self.queries + 1,
            total_cost: self.total_cost + cost,
        }
    }

    pub fn queries(&self) -> usize {
        self.queries
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn average_cost(&self) -> Option<f64> {
        (self.queries > 0).then(|| self.total_cost / self.queries as f64)
    }
}

pub struct Session<'a> {
    pub provider: &'a dyn ModelProvider,
    pub index: &'a [IndexRecord],
    pub corpus_dir: &'a Path,
    pub top_k: usize,
    pub options: CompletionOptions,
}

pub fn run(args: ChatArgs) -> Result<()> {
    let provider = select_provider(&args.provider)?;
    let index = load_index(&args.index_path)?;
    info!(
        index_path = %args.index_path.display(),
        records = index.len(),
        corpus_dir = %args.corpus_dir.display(),
        chat_model = %provider.chat_model(),
        "chat session started"
    );

    let session = Session {
        provider: provider.as_ref(),
        index: &index,
        corpus_dir: &args.corpus_dir,
        top_k: args.generation.top_k,
        options: args.generation.completion_options(),
    };

    let stdin = io::stdin();
    let mut output = io::stdout().lock();
    let stats = run_session(&session, stdin.lock(), &mut output)?;
    info!(
        queries = stats.queries(),
        total_cost = stats.total_cost(),
        "chat session finished"
    );
    Ok(())
}

pub fn run_session(
    session: &Session<'_>,
    mut input: impl BufRead,
    output: &mut impl Write,
) -> Result<SessionStats> {
    write_banner(output)?;
    let mut stats = SessionStats::default();

    loop {
        write!(output, "\nYour question: ")?;
        output.flush()?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .context("failed to read from input")?;
        let command = if read == 0 {
            SessionCommand::Exit
        } else {
            SessionCommand::parse(&line)
        };

        match command {
            SessionCommand::Exit => {
                write_stats(output, &stats)?;
                writeln!(output, "\nGoodbye!")?;
                break;
            }
            SessionCommand::Stats => write_stats(output, &stats)?,
            SessionCommand::ViewSources => write_documents(output, session.corpus_dir)?,
            SessionCommand::View(name) => write_document(output, session.corpus_dir, &name)?,
            SessionCommand::Empty => writeln!(output, "Please enter a question or command.")?,
            SessionCommand::Question(question) => {
                match answer_with_sources(
                    session.provider,
                    session.index,
                    &question,
                    session.top_k,
                    session.options,
                ) {
                    Ok(response) => {
                        stats = stats.record(response.answer.cost);
                        writeln!(output)?;
                        write_response(output, &response)?;
                    }
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "question failed");
                        writeln!(output, "Error processing your question: {err:#}")?;
                    }
                }
            }
        }
    }

    output.flush()?;
    Ok(stats)
}

fn write_banner(output: &mut impl Write) -> Result<()> {
    writeln!(output, "Document Q&A")?;
    writeln!(output, "{RULE}")?;
    writeln!(output, "Available commands:")?;
    writeln!(output, "  - Ask any question")?;
    writeln!(output, "  - 'view sources' - See all available documents")?;
    writeln!(output, "  - 'view [filename]' - Read a specific document")?;
    writeln!(output, "  - 'stats' - View session statistics")?;
    writeln!(output, "  - 'exit' - Quit the application")?;
    writeln!(output, "{RULE}")?;
    Ok(())
}

fn write_stats(output: &mut impl Write, stats: &SessionStats) -> Result<()> {
    writeln!(output, "\nSession statistics")?;
    writeln!(output, "{RULE}")?;

    let Some(average) = stats.average_cost() else {
        writeln!(output, "No queries processed in this session.")?;
        return Ok(());
    };

    writeln!(output, "Queries processed: {}", stats.queries())?;
    writeln!(output, "Total cost: {}", format_cost(stats.total_cost()))?;
    writeln!(output, "Average cost per query: {}", format_cost(average))?;
    writeln!(
        output,
        "Estimated cost per 100 queries: ${:.4}",
        average * 100.0
    )?;
    Ok(())
}

fn write_documents(output: &mut impl Write, corpus_dir: &Path) -> Result<()> {
    writeln!(output, "\nAvailable documents")?;
    writeln!(output, "{RULE}")?;

    let documents = match load_corpus(corpus_dir) {
        Ok(documents) => documents,
        Err(err) => {
            writeln!(output, "Error reading knowledge base: {err}")?;
            return Ok(());
        }
    };
    if documents.is_empty() {
        writeln!(output, "No documents found in knowledge base.")?;
        return Ok(());
    }

    for document in &documents {
        writeln!(
            output,
            " {} ({} words)",
            document.filename,
            word_count(&document.content)
        )?;
        writeln!(
            output,
            "   Preview: {}...",
            preview(&document.content, DOCUMENT_PREVIEW_CHARS)
        )?;
        writeln!(output)?;
    }
    Ok(())
}

fn write_document(output: &mut impl Write, corpus_dir: &Path, name: &str) -> Result<()> {
    match read_document(corpus_dir, name) {
        Ok(document) => {
            writeln!(output, "\nDocument: {}", document.filename)?;
            writeln!(output, "{RULE}")?;
            writeln!(output, "{}", document.content)?;
        }
        Err(err) => {
            warn!(document = name, error = %err, "document view failed");
            writeln!(
                output,
                "Document '{name}' not found. Use 'view sources' to see available documents."
            )?;
        }
    }
    Ok(())
}
