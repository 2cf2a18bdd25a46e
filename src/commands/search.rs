use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::SearchArgs;
use crate::index::load_index;
use crate::provider::select_provider;
use crate::retrieval::retrieve_top_k;

use super::query::{write_sources, SourceSummary};

const SEARCH_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize)]
struct SearchResponse {
    query: String,
    limit: usize,
    returned: usize,
    results: Vec<SourceSummary>,
}

pub fn run(args: SearchArgs) -> Result<()> {
    let provider = select_provider(&args.provider)?;
    let index = load_index(&args.index_path)?;

    let chunks = retrieve_top_k(provider.as_ref(), &args.query, args.limit, &index)
        .with_context(|| format!("failed to search for: {}", args.query))?;
    info!(
        records = index.len(),
        limit = args.limit,
        returned = chunks.len(),
        "search completed"
    );

    let response = SearchResponse {
        query: args.query.clone(),
        limit: args.limit,
        returned: chunks.len(),
        results: SourceSummary::from_ranked(&chunks, SEARCH_PREVIEW_CHARS),
    };

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &response)
            .context("failed to serialize search json output")?;
        writeln!(output)?;
    } else {
        writeln!(output, "Search: {}", response.query)?;
        write_sources(&mut output, &response.results)?;
    }
    output.flush()?;
    Ok(())
}
