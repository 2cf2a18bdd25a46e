use tracing::{info, warn};

use crate::answer::answer_question;
use crate::error::Result;
use crate::model::{CompletionOptions, IndexRecord};
use crate::provider::ModelProvider;
use crate::retrieval::{retrieve_top_k, DEFAULT_TOP_K};
use crate::util::{format_similarity_score, now_utc_string};

use super::cases::TestCase;
use super::report::{
    CaseFailure, CaseOutcome, EvaluationAccumulator, EvaluationReport, EvaluationResult,
};
use super::scoring::score_case;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationOptions {
    pub top_k: usize,
    pub completion: CompletionOptions,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            completion: CompletionOptions::default(),
        }
    }
}

pub fn evaluate_case(
    provider: &dyn ModelProvider,
    index: &[IndexRecord],
    case: &TestCase,
    options: EvaluationOptions,
) -> Result<EvaluationResult> {
    let retrieved = retrieve_top_k(provider, &case.question, options.top_k, index)?;
    let answer = answer_question(provider, &case.question, &retrieved, options.completion)?;
    let metrics = score_case(case, &retrieved, &answer.text);

    Ok(EvaluationResult {
        id: case.id,
        question: case.question.clone(),
        expected_sources: case.expected_sources.clone(),
        expected_keywords: case.expected_keywords.clone(),
        retrieved_chunks: retrieved,
        answer: answer.text,
        metrics,
        usage: answer.usage,
        cost: answer.cost,
    })
}

/// Evaluates every case in order. A failing case is recorded and the run
/// moves on to the next one.
pub fn run_evaluation(
    provider: &dyn ModelProvider,
    index: &[IndexRecord],
    cases: &[TestCase],
    options: EvaluationOptions,
) -> EvaluationReport {
    info!(cases = cases.len(), records = index.len(), "evaluation started");

    let accumulator = cases
        .iter()
        .fold(EvaluationAccumulator::default(), |accumulator, case| {
            accumulator.record(run_case(provider, index, case, options))
        });

    info!(
        completed = accumulator.results().len(),
        failed = accumulator.failures().len(),
        "evaluation finished"
    );
    accumulator.finish(now_utc_string())
}

fn run_case(
    provider: &dyn ModelProvider,
    index: &[IndexRecord],
    case: &TestCase,
    options: EvaluationOptions,
) -> CaseOutcome {
    match evaluate_case(provider, index, case, options) {
        Ok(result) => {
            let top_source = result
                .retrieved_chunks
                .first()
                .map(|chunk| {
                    format!(
                        "{} ({})",
                        chunk.filename(),
                        format_similarity_score(chunk.similarity_score)
                    )
                })
                .unwrap_or_else(|| "none".to_string());
            info!(
                id = case.id,
                retrieval_accuracy = result.metrics.retrieval_accuracy,
                answer_quality = result.metrics.answer_quality,
                top_source = %top_source,
                "case evaluated"
            );
            CaseOutcome::Completed(Box::new(result))
        }
        Err(err) => {
            warn!(id = case.id, question = %case.question, error = %err, "case failed");
            CaseOutcome::Failed(CaseFailure {
                id: case.id,
                question: case.question.clone(),
                error: err.to_string(),
            })
        }
    }
}
