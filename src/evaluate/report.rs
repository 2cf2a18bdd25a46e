use std::collections::HashMap;

use serde::{Serialize, Serializer};
use serde::ser::SerializeSeq;

use crate::model::{ScoredChunk, UsageStats};

use super::scoring::CaseMetrics;

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub id: u32,
    pub question: String,
    pub expected_sources: Vec<String>,
    pub expected_keywords: Vec<String>,
    #[serde(serialize_with = "serialize_retrieved")]
    pub retrieved_chunks: Vec<ScoredChunk>,
    pub answer: String,
    pub metrics: CaseMetrics,
    pub usage: UsageStats,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseFailure {
    pub id: u32,
    pub question: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub enum CaseOutcome {
    Completed(Box<EvaluationResult>),
    Failed(CaseFailure),
}

/// Outcomes gathered so far. Each step consumes the accumulator and returns
/// the extended one.
#[derive(Debug, Clone, Default)]
pub struct EvaluationAccumulator {
    results: Vec<EvaluationResult>,
    failures: Vec<CaseFailure>,
}

impl EvaluationAccumulator {
    pub fn record(mut self, outcome: CaseOutcome) -> Self {
        match outcome {
            CaseOutcome::Completed(result) => self.results.push(*result),
            CaseOutcome::Failed(failure) => self.failures.push(failure),
        }
        self
    }

    pub fn results(&self) -> &[EvaluationResult] {
        &self.results
    }

    pub fn failures(&self) -> &[CaseFailure] {
        &self.failures
    }

    pub fn finish(self, generated_at: String) -> EvaluationReport {
        let summary = summarize(&self.results, self.failures.len());
        let best = pick_case(&self.results, |candidate, current| candidate > current);
        let worst = pick_case(&self.results, |candidate, current| candidate < current);
        let source_breakdown = source_breakdown(&self.results);

        EvaluationReport {
            generated_at,
            summary,
            best,
            worst,
            source_breakdown,
            results: self.results,
            failures: self.failures,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSummary {
    pub total_questions: usize,
    pub completed: usize,
    pub failed: usize,
    pub avg_retrieval_accuracy: f64,
    pub avg_answer_quality: f64,
    pub avg_keyword_coverage: f64,
    pub avg_top_source_relevance: f64,
    pub total_cost: f64,
    pub avg_cost_per_question: f64,
    pub total_tokens: u64,
    pub avg_tokens_per_question: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseHighlight {
    pub id: u32,
    pub question: String,
    pub retrieval_accuracy: f64,
    pub answer_quality: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStats {
    pub filename: String,
    pub retrieved: usize,
    pub top_rank: usize,
    pub top_rank_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub generated_at: String,
    pub summary: EvaluationSummary,
    pub best: Option<CaseHighlight>,
    pub worst: Option<CaseHighlight>,
    pub source_breakdown: Vec<SourceStats>,
    pub results: Vec<EvaluationResult>,
    pub failures: Vec<CaseFailure>,
}

fn mean(values: impl Iterator<Item = f64>, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    sum(values) / count as f64
}

// `Iterator::sum` over f64 starts at -0.0, which would print as "$-0.000000".
fn sum(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(0.0, |total, value| total + value)
}

fn summarize(results: &[EvaluationResult], failed: usize) -> EvaluationSummary {
    let completed = results.len();
    let total_cost = sum(results.iter().map(|result| result.cost));
    let total_tokens = results
        .iter()
        .map(|result| result.usage.total_tokens)
        .sum::<u64>();

    EvaluationSummary {
        total_questions: completed + failed,
        completed,
        failed,
        avg_retrieval_accuracy: mean(
            results.iter().map(|result| result.metrics.retrieval_accuracy),
            completed,
        ),
        avg_answer_quality: mean(
            results
                .iter()
                .map(|result| f64::from(result.metrics.answer_quality)),
            completed,
        ),
        avg_keyword_coverage: mean(
            results.iter().map(|result| result.metrics.keyword_coverage),
            completed,
        ),
        avg_top_source_relevance: mean(
            results
                .iter()
                .map(|result| result.metrics.top_source_relevance),
            completed,
        ),
        total_cost,
        avg_cost_per_question: mean(std::iter::once(total_cost), completed),
        total_tokens,
        avg_tokens_per_question: mean(std::iter::once(total_tokens as f64), completed),
    }
}

/// Case whose retrieval accuracy wins under `replaces`; the first one seen
/// keeps its place on ties.
fn pick_case(
    results: &[EvaluationResult],
    replaces: impl Fn(f64, f64) -> bool,
) -> Option<CaseHighlight> {
    let mut chosen = results.first()?;
    for candidate in &results[1..] {
        if replaces(
            candidate.metrics.retrieval_accuracy,
            chosen.metrics.retrieval_accuracy,
        ) {
            chosen = candidate;
        }
    }

    Some(CaseHighlight {
        id: chosen.id,
        question: chosen.question.clone(),
        retrieval_accuracy: chosen.metrics.retrieval_accuracy,
        answer_quality: chosen.metrics.answer_quality,
    })
}

/// How often each file was retrieved and how often it ranked first, in
/// order of first appearance.
fn source_breakdown(results: &[EvaluationResult]) -> Vec<SourceStats> {
    let mut positions = HashMap::<&str, usize>::new();
    let mut stats = Vec::<SourceStats>::new();

    for result in results {
        for (rank, chunk) in result.retrieved_chunks.iter().enumerate() {
            let position = *positions.entry(chunk.filename()).or_insert_with(|| {
                stats.push(SourceStats {
                    filename: chunk.filename().to_string(),
                    retrieved: 0,
                    top_rank: 0,
                    top_rank_percentage: 0.0,
                });
                stats.len() - 1
            });

            let entry = &mut stats[position];
            entry.retrieved += 1;
            if rank == 0 {
                entry.top_rank += 1;
            }
        }
    }

    for entry in &mut stats {
        entry.top_rank_percentage = entry.top_rank as f64 / entry.retrieved as f64 * 100.0;
    }
    stats
}

fn serialize_retrieved<S: Serializer>(
    chunks: &[ScoredChunk],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct RetrievedSummary<'a> {
        id: &'a str,
        filename: &'a str,
        similarity_score: f64,
        text: &'a str,
    }

    let mut seq = serializer.serialize_seq(Some(chunks.len()))?;
    for chunk in chunks {
        seq.serialize_element(&RetrievedSummary {
            id: &chunk.record.id,
            filename: chunk.filename(),
            similarity_score: chunk.similarity_score,
            text: chunk.text(),
        })?;
    }
    seq.end()
}
