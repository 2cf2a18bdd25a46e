mod cases;
mod report;
mod run;
mod scoring;
#[cfg(test)]
mod tests;

pub use cases::{default_test_cases, load_test_cases, normalize_test_cases, TestCase};
pub use report::{
    CaseFailure, CaseOutcome, EvaluationAccumulator, EvaluationReport, EvaluationResult,
};
pub use run::{evaluate_case, run_evaluation, EvaluationOptions};
pub use scoring::{answer_quality, keyword_coverage, retrieval_accuracy, score_case, CaseMetrics};
