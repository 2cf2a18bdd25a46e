use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::error::{ProviderError, RagError};
use crate::index::build_index;
use crate::model::{
    ChatMessage, Completion, CompletionOptions, Document, IndexRecord, ScoredChunk, UsageStats,
};
use crate::provider::{LocalProvider, ModelProvider};
use crate::semantic::ChunkingConfig;

fn scored(filename: &str, score: f64) -> ScoredChunk {
    ScoredChunk {
        record: IndexRecord {
            id: format!("{filename}-chunk-0"),
            filename: filename.to_string(),
            text: String::new(),
            embedding: vec![1.0],
        },
        similarity_score: score,
    }
}

fn result(id: u32, accuracy: f64, retrieved: &[&str], tokens: u64, cost: f64) -> EvaluationResult {
    EvaluationResult {
        id,
        question: format!("question {id}"),
        expected_sources: vec!["a.txt".to_string()],
        expected_keywords: vec!["k".to_string()],
        retrieved_chunks: retrieved
            .iter()
            .enumerate()
            .map(|(rank, filename)| scored(filename, 1.0 - rank as f64 * 0.1))
            .collect(),
        answer: String::new(),
        metrics: CaseMetrics {
            retrieval_accuracy: accuracy,
            keyword_coverage: 50.0,
            answer_quality: 3,
            top_source_relevance: 1.0,
            expected_sources_found: 0,
            keywords_found: 0,
        },
        usage: UsageStats::new(tokens, 0),
        cost,
    }
}

/// Local embeddings; completions return a fixed answer and fail for the
/// question starting with `fail_on`.
struct ScriptedProvider {
    local: LocalProvider,
    answer: String,
    fail_on: Option<String>,
    completions: AtomicUsize,
}

impl ModelProvider for ScriptedProvider {
    fn embedding_model(&self) -> &str {
        self.local.embedding_model()
    }

    fn chat_model(&self) -> &str {
        "gpt-3.5-turbo"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.local.embed(text)
    }

    fn complete(
        &self,
        messages: &[ChatMessage],
        _options: CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        let prompt = messages
            .last()
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        if let Some(fail_on) = &self.fail_on {
            if prompt.contains(&format!("Question: {fail_on}")) {
                return Err(ProviderError::Status {
                    status: 401,
                    body: "invalid key".to_string(),
                });
            }
        }
        Ok(Completion {
            text: self.answer.clone(),
            usage: UsageStats::new(1000, 500),
            model: "gpt-3.5-turbo".to_string(),
        })
    }
}

fn corpus_index(provider: &dyn ModelProvider) -> Vec<IndexRecord> {
    let documents = vec![
        Document {
            filename: "a.txt".to_string(),
            content: "React hooks let functional components hold state with useState.".to_string(),
        },
        Document {
            filename: "b.txt".to_string(),
            content: "Express is a web framework for Node.js with routing.".to_string(),
        },
        Document {
            filename: "c.txt".to_string(),
            content: "CSS Grid is two-dimensional while Flexbox is one-dimensional.".to_string(),
        },
    ];
    build_index(provider, &documents, ChunkingConfig::default(), 8).expect("index builds")
}

#[test]
fn expected_source_in_top_three_scores_full_accuracy() {
    let retrieved = vec![scored("a.txt", 0.9), scored("b.txt", 0.5), scored("c.txt", 0.1)];
    let (accuracy, found) = retrieval_accuracy(&["a.txt".to_string()], &retrieved);
    assert_eq!(accuracy, 100.0);
    assert_eq!(found, 1);
}

#[test]
fn partial_source_match_scores_proportionally() {
    let retrieved = vec![scored("a.txt", 0.9), scored("a.txt", 0.8)];
    let expected = vec!["a.txt".to_string(), "z.txt".to_string()];
    assert_eq!(retrieval_accuracy(&expected, &retrieved), (50.0, 1));
}

#[test]
fn keyword_matching_ignores_case() {
    let keywords = vec![
        "useState".to_string(),
        "Functional Components".to_string(),
        "array".to_string(),
        "=>".to_string(),
    ];
    let answer = "USESTATE returns an Array for functional components [Source 1]";
    assert_eq!(keyword_coverage(&keywords, answer), (75.0, 3));
}

#[test]
fn answer_quality_rounds_then_clamps() {
    assert_eq!(answer_quality(0.0, 0.0), 1);
    assert_eq!(answer_quality(100.0, 100.0), 5);
    assert_eq!(answer_quality(50.0, 100.0), 4); // 1.5 + 2 = 3.5
    assert_eq!(answer_quality(25.0, 0.0), 1); // 0.75 rounds to 1
    assert_eq!(answer_quality(75.0, 0.0), 2); // 2.25
    assert_eq!(answer_quality(60.0, 50.0), 3); // 1.8 + 1 = 2.8
}

#[test]
fn retrieval_accuracy_ignores_chunks_below_the_top_three() {
    let case = TestCase::new(1, "q", &["far.txt"], &["far"]);
    let retrieved = vec![
        scored("a.txt", 0.9),
        scored("b.txt", 0.8),
        scored("c.txt", 0.7),
        scored("far.txt", 0.6),
        scored("d.txt", 0.5),
        scored("e.txt", 0.4),
    ];
    let metrics = score_case(&case, &retrieved, "far away");
    assert_eq!(metrics.retrieval_accuracy, 0.0);
    assert_eq!(metrics.expected_sources_found, 0);

    let metrics = score_case(&case, &retrieved[2..], "far away");
    assert_eq!(metrics.retrieval_accuracy, 100.0);
}

#[test]
fn score_case_reports_top_source_relevance() {
    let case = TestCase::new(1, "q", &["b.txt"], &["grid"]);
    let retrieved = vec![scored("a.txt", 0.42), scored("b.txt", 0.3)];
    let metrics = score_case(&case, &retrieved, "CSS Grid layout");
    assert_eq!(metrics.retrieval_accuracy, 100.0);
    assert_eq!(metrics.keyword_coverage, 100.0);
    assert_eq!(metrics.answer_quality, 5);
    assert!((metrics.top_source_relevance - 0.42).abs() < 1e-12);

    let empty = score_case(&case, &[], "nothing");
    assert_eq!(empty.top_source_relevance, 0.0);
    assert_eq!(empty.answer_quality, 1);
}

#[test]
fn best_and_worst_prefer_first_on_ties() {
    let report = EvaluationAccumulator::default()
        .record(CaseOutcome::Completed(Box::new(result(1, 50.0, &["a.txt"], 10, 0.1))))
        .record(CaseOutcome::Completed(Box::new(result(2, 100.0, &["a.txt"], 10, 0.1))))
        .record(CaseOutcome::Completed(Box::new(result(3, 100.0, &["a.txt"], 10, 0.1))))
        .record(CaseOutcome::Completed(Box::new(result(4, 50.0, &["a.txt"], 10, 0.1))))
        .finish("2026-01-01T00:00:00Z".to_string());

    assert_eq!(report.best.as_ref().map(|case| case.id), Some(2));
    assert_eq!(report.worst.as_ref().map(|case| case.id), Some(1));
}

#[test]
fn summary_averages_over_completed_cases() {
    let report = EvaluationAccumulator::default()
        .record(CaseOutcome::Completed(Box::new(result(1, 100.0, &["a.txt"], 300, 0.002))))
        .record(CaseOutcome::Completed(Box::new(result(2, 0.0, &["b.txt"], 100, 0.004))))
        .record(CaseOutcome::Failed(CaseFailure {
            id: 3,
            question: "question 3".to_string(),
            error: "provider returned HTTP 500".to_string(),
        }))
        .finish("2026-01-01T00:00:00Z".to_string());

    let summary = &report.summary;
    assert_eq!(summary.total_questions, 3);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.avg_retrieval_accuracy, 50.0);
    assert_eq!(summary.avg_answer_quality, 3.0);
    assert_eq!(summary.total_tokens, 400);
    assert_eq!(summary.avg_tokens_per_question, 200.0);
    assert!((summary.total_cost - 0.006).abs() < 1e-12);
    assert!((summary.avg_cost_per_question - 0.003).abs() < 1e-12);
    assert_eq!(report.failures.len(), 1);
}

#[test]
fn all_failed_run_reports_positive_zero_totals() {
    let report = EvaluationAccumulator::default()
        .record(CaseOutcome::Failed(CaseFailure {
            id: 1,
            question: "question 1".to_string(),
            error: "provider returned HTTP 500".to_string(),
        }))
        .finish("2026-01-01T00:00:00Z".to_string());

    assert!(report.summary.total_cost.is_sign_positive());
    assert!(report.summary.avg_cost_per_question.is_sign_positive());
    let value = serde_json::to_value(&report).expect("report serializes");
    assert_eq!(value["summary"]["total_cost"].to_string(), "0.0");
}

#[test]
fn empty_run_has_zeroed_summary_and_no_highlights() {
    let report = EvaluationAccumulator::default().finish("2026-01-01T00:00:00Z".to_string());
    assert_eq!(report.summary.avg_retrieval_accuracy, 0.0);
    assert_eq!(report.summary.avg_cost_per_question, 0.0);
    assert!(report.best.is_none());
    assert!(report.worst.is_none());
    assert!(report.source_breakdown.is_empty());
}

#[test]
fn source_breakdown_counts_retrievals_and_top_ranks() {
    let report = EvaluationAccumulator::default()
        .record(CaseOutcome::Completed(Box::new(result(
            1,
            100.0,
            &["a.txt", "b.txt", "a.txt"],
            0,
            0.0,
        ))))
        .record(CaseOutcome::Completed(Box::new(result(
            2,
            100.0,
            &["b.txt", "c.txt"],
            0,
            0.0,
        ))))
        .finish("2026-01-01T00:00:00Z".to_string());

    let breakdown = report
        .source_breakdown
        .iter()
        .map(|stats| (stats.filename.as_str(), stats.retrieved, stats.top_rank))
        .collect::<Vec<_>>();
    assert_eq!(
        breakdown,
        vec![("a.txt", 2, 1), ("b.txt", 2, 1), ("c.txt", 1, 0)]
    );
    assert_eq!(report.source_breakdown[0].top_rank_percentage, 50.0);
}

#[test]
fn failing_case_does_not_abort_the_batch() {
    let provider = ScriptedProvider {
        local: LocalProvider::new(128),
        answer: "useState keeps state in functional components [Source 1]".to_string(),
        fail_on: Some("What is Express".to_string()),
        completions: AtomicUsize::new(0),
    };
    let index = corpus_index(&provider);
    let cases = vec![
        TestCase::new(1, "What is useState?", &["a.txt"], &["useState", "state"]),
        TestCase::new(2, "What is Express used for?", &["b.txt"], &["routing"]),
        TestCase::new(3, "How does CSS Grid differ from Flexbox?", &["c.txt"], &["grid"]),
    ];

    let report = run_evaluation(&provider, &index, &cases, EvaluationOptions::default());
    assert_eq!(provider.completions.load(Ordering::SeqCst), 3);
    assert_eq!(report.summary.completed, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].id, 2);
    assert!(report.failures[0].error.contains("401"));

    let first = &report.results[0];
    assert_eq!(first.retrieved_chunks.len(), 3);
    assert_eq!(first.metrics.retrieval_accuracy, 100.0);
    assert_eq!(first.metrics.keyword_coverage, 100.0);
    assert!((first.cost - 0.0025).abs() < 1e-12);
}

#[test]
fn evaluate_case_surfaces_provider_errors() {
    let provider = ScriptedProvider {
        local: LocalProvider::new(64),
        answer: String::new(),
        fail_on: Some("anything".to_string()),
        completions: AtomicUsize::new(0),
    };
    let index = corpus_index(&provider);
    let case = TestCase::new(1, "anything", &["a.txt"], &["x"]);
    let result = evaluate_case(&provider, &index, &case, EvaluationOptions::default());
    assert!(matches!(result, Err(RagError::Provider(_))));
}

#[test]
fn report_serializes_retrieved_chunks_without_embeddings() {
    let report = EvaluationAccumulator::default()
        .record(CaseOutcome::Completed(Box::new(result(1, 100.0, &["a.txt"], 0, 0.0))))
        .finish("2026-01-01T00:00:00Z".to_string());
    let value = serde_json::to_value(&report).expect("report serializes");
    let chunk = &value["results"][0]["retrieved_chunks"][0];
    assert_eq!(chunk["filename"], "a.txt");
    assert!(chunk.get("embedding").is_none());
}

#[test]
fn default_suite_is_well_formed() {
    let cases = normalize_test_cases(default_test_cases()).expect("default suite is valid");
    assert_eq!(cases.len(), 10);
    assert!(cases.iter().all(|case| !case.expected_sources.is_empty()));
}

#[test]
fn loaded_cases_get_ids_and_deduplicated_sets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cases.json");
    std::fs::write(
        &path,
        r#"[
            {"question": " What is PTO? ", "expected_sources": ["pto.txt", "pto.txt"], "expected_keywords": ["days", " days "]},
            {"id": 7, "question": "Pricing?", "expected_sources": ["pricing.txt"], "expected_keywords": ["$"]}
        ]"#,
    )
    .expect("write");

    let cases = load_test_cases(&path).expect("cases load");
    assert_eq!(cases[0].id, 8);
    assert_eq!(cases[0].question, "What is PTO?");
    assert_eq!(cases[0].expected_sources, vec!["pto.txt"]);
    assert_eq!(cases[0].expected_keywords, vec!["days"]);
    assert_eq!(cases[1].id, 7);
}

#[test]
fn missing_ids_never_collide_with_explicit_ones() {
    let cases = vec![
        TestCase::new(0, "first", &["a.txt"], &["a"]),
        TestCase::new(1, "second", &["b.txt"], &["b"]),
        TestCase::new(0, "third", &["c.txt"], &["c"]),
    ];
    let ids = normalize_test_cases(cases)
        .expect("cases normalize")
        .iter()
        .map(|case| case.id)
        .collect::<Vec<u32>>();
    assert_eq!(ids, vec![2, 1, 3]);

    let unnumbered = vec![
        TestCase::new(0, "first", &["a.txt"], &["a"]),
        TestCase::new(0, "second", &["b.txt"], &["b"]),
    ];
    let ids = normalize_test_cases(unnumbered)
        .expect("cases normalize")
        .iter()
        .map(|case| case.id)
        .collect::<Vec<u32>>();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn duplicate_explicit_ids_are_rejected() {
    let cases = vec![
        TestCase::new(4, "first", &["a.txt"], &["a"]),
        TestCase::new(4, "second", &["b.txt"], &["b"]),
    ];
    assert!(matches!(
        normalize_test_cases(cases),
        Err(RagError::Configuration(_))
    ));
}

#[test]
fn cases_without_expectations_are_rejected() {
    let cases = vec![TestCase::new(1, "q", &[], &["k"])];
    assert!(matches!(
        normalize_test_cases(cases),
        Err(RagError::Configuration(_))
    ));
}
