use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::EvaluateArgs;
use crate::evaluate::{
    default_test_cases, load_test_cases, normalize_test_cases, run_evaluation,
    EvaluationOptions, EvaluationReport,
};
use crate::index::load_index;
use crate::provider::select_provider;
use crate::util::{format_cost, format_similarity_score, write_json_pretty};

pub fn run(args: EvaluateArgs) -> Result<()> {
    let provider = select_provider(&args.provider)?;
    let index = load_index(&args.index_path)?;
    let cases = match &args.cases {
        Some(path) => load_test_cases(path)
            .with_context(|| format!("failed to load test cases from {}", path.display()))?,
        None => normalize_test_cases(default_test_cases())?,
    };

    let options = EvaluationOptions {
        top_k: args.generation.top_k,
        completion: args.generation.completion_options(),
    };
    let report = run_evaluation(provider.as_ref(), &index, &cases, options);

    write_json_pretty(&args.report_path, &report)?;
    info!(
        report_path = %args.report_path.display(),
        completed = report.summary.completed,
        failed = report.summary.failed,
        "evaluation report written"
    );
    if report.summary.failed > 0 {
        warn!(failed = report.summary.failed, "some evaluation cases failed");
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    write_text_report(&mut output, &report)?;
    output.flush()?;
    Ok(())
}

pub fn write_text_report(output: &mut impl Write, report: &EvaluationReport) -> Result<()> {
    let summary = &report.summary;

    writeln!(output, "Evaluation report ({})", report.generated_at)?;
    writeln!(
        output,
        "Questions: {} total, {} completed, {} failed",
        summary.total_questions, summary.completed, summary.failed
    )?;
    writeln!(output, "Retrieval accuracy: {:.1}%", summary.avg_retrieval_accuracy)?;
    writeln!(output, "Answer quality: {:.1}/5", summary.avg_answer_quality)?;
    writeln!(output, "Keyword coverage: {:.1}%", summary.avg_keyword_coverage)?;
    writeln!(
        output,
        "Top source relevance: {}",
        format_similarity_score(summary.avg_top_source_relevance)
    )?;
    writeln!(
        output,
        "Cost: {} total, {} per question",
        format_cost(summary.total_cost),
        format_cost(summary.avg_cost_per_question)
    )?;
    writeln!(
        output,
        "Tokens: {} total, {:.0} per question",
        summary.total_tokens, summary.avg_tokens_per_question
    )?;

    if let Some(best) = &report.best {
        writeln!(
            output,
            "Best: #{} {} (retrieval {:.1}%, quality {}/5)",
            best.id, best.question, best.retrieval_accuracy, best.answer_quality
        )?;
    }
    if let Some(worst) = &report.worst {
        writeln!(
            output,
            "Worst: #{} {} (retrieval {:.1}%, quality {}/5)",
            worst.id, worst.question, worst.retrieval_accuracy, worst.answer_quality
        )?;
    }

    if !report.source_breakdown.is_empty() {
        writeln!(output)?;
        writeln!(output, "Sources:")?;
        for source in &report.source_breakdown {
            writeln!(
                output,
                "\t{}\tretrieved={}\ttop_rank={} ({:.1}%)",
                source.filename, source.retrieved, source.top_rank, source.top_rank_percentage
            )?;
        }
    }

    writeln!(output)?;
    writeln!(output, "Cases:")?;
    for result in &report.results {
        writeln!(output, "{}.\t{}", result.id, result.question)?;
        writeln!(
            output,
            "\tretrieval={:.1}% ({}/{}) keywords={:.1}% ({}/{}) quality={}/5 cost={}",
            result.metrics.retrieval_accuracy,
            result.metrics.expected_sources_found,
            result.expected_sources.len(),
            result.metrics.keyword_coverage,
            result.metrics.keywords_found,
            result.expected_keywords.len(),
            result.metrics.answer_quality,
            format_cost(result.cost)
        )?;
        let retrieved = result
            .retrieved_chunks
            .iter()
            .map(|chunk| {
                format!(
                    "{} ({})",
                    chunk.filename(),
                    format_similarity_score(chunk.similarity_score)
                )
            })
            .collect::<Vec<String>>();
        writeln!(output, "\tretrieved: {}", retrieved.join(", "))?;
    }
    for failure in &report.failures {
        writeln!(output, "{}.\t{}", failure.id, failure.question)?;
        writeln!(output, "\tfailed: {}", failure.error)?;
    }

    Ok(())
}
