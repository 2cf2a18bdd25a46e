use serde::Serialize;

use crate::model::ScoredChunk;

use super::cases::TestCase;

/// Retrieval accuracy only looks at this many top-ranked chunks, however
/// many were retrieved for the answer.
pub const RETRIEVAL_ACCURACY_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CaseMetrics {
    pub retrieval_accuracy: f64,
    pub keyword_coverage: f64,
    pub answer_quality: u8,
    pub top_source_relevance: f64,
    pub expected_sources_found: usize,
    pub keywords_found: usize,
}

pub fn retrieval_accuracy(expected_sources: &[String], retrieved: &[ScoredChunk]) -> (f64, usize) {
    if expected_sources.is_empty() {
        return (0.0, 0);
    }

    let found = expected_sources
        .iter()
        .filter(|source| retrieved.iter().any(|chunk| chunk.filename() == source.as_str()))
        .count();
    (found as f64 / expected_sources.len() as f64 * 100.0, found)
}

pub fn keyword_coverage(expected_keywords: &[String], answer: &str) -> (f64, usize) {
    if expected_keywords.is_empty() {
        return (0.0, 0);
    }

    let answer_lower = answer.to_lowercase();
    let found = expected_keywords
        .iter()
        .filter(|keyword| answer_lower.contains(&keyword.to_lowercase()))
        .count();
    (found as f64 / expected_keywords.len() as f64 * 100.0, found)
}

/// Heuristic 1–5 grade: `round(coverage × 3 + accuracy × 2)` with both
/// terms as fractions, clamped to [1, 5].
pub fn answer_quality(keyword_coverage: f64, retrieval_accuracy: f64) -> u8 {
    let raw = (keyword_coverage / 100.0 * 3.0 + retrieval_accuracy / 100.0 * 2.0).round();
    raw.clamp(1.0, 5.0) as u8
}

pub fn score_case(case: &TestCase, retrieved: &[ScoredChunk], answer: &str) -> CaseMetrics {
    let scored_depth = retrieved.len().min(RETRIEVAL_ACCURACY_DEPTH);
    let (retrieval_accuracy, expected_sources_found) =
        retrieval_accuracy(&case.expected_sources, &retrieved[..scored_depth]);
    let (keyword_coverage, keywords_found) = keyword_coverage(&case.expected_keywords, answer);

    CaseMetrics {
        retrieval_accuracy,
        keyword_coverage,
        answer_quality: answer_quality(keyword_coverage, retrieval_accuracy),
        top_source_relevance: retrieved
            .first()
            .map(|chunk| chunk.similarity_score)
            .unwrap_or(0.0),
        expected_sources_found,
        keywords_found,
    }
}
