use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub id: u32,
    pub question: String,
    pub expected_sources: Vec<String>,
    pub expected_keywords: Vec<String>,
}

impl TestCase {
    pub fn new(id: u32, question: &str, sources: &[&str], keywords: &[&str]) -> Self {
        Self {
            id,
            question: question.to_string(),
            expected_sources: sources.iter().map(|value| value.to_string()).collect(),
            expected_keywords: keywords.iter().map(|value| value.to_string()).collect(),
        }
    }
}

pub fn default_test_cases() -> Vec<TestCase> {
    vec![
        TestCase::new(
            1,
            "What is the useState hook in React?",
            &["react-hooks-guide.txt"],
            &["useState", "state", "functional components", "array"],
        ),
        TestCase::new(
            2,
            "How do arrow functions work in JavaScript?",
            &["modern-javascript-features.txt"],
            &["arrow functions", "concise", "this context", "=>"],
        ),
        TestCase::new(
            3,
            "What is Express.js used for?",
            &["nodejs-express-backend.txt"],
            &["Express.js", "web framework", "Node.js", "routing"],
        ),
        TestCase::new(
            4,
            "How does CSS Grid differ from Flexbox?",
            &["css-grid-flexbox.txt"],
            &["CSS Grid", "Flexbox", "two-dimensional", "one-dimensional"],
        ),
        TestCase::new(
            5,
            "What are Core Web Vitals?",
            &["web-performance-optimization.txt"],
            &["Core Web Vitals", "LCP", "FID", "CLS", "Google"],
        ),
        TestCase::new(
            6,
            "How do you use template literals in JavaScript?",
            &["modern-javascript-features.txt"],
            &["template literals", "backticks", "${}", "string interpolation"],
        ),
        TestCase::new(
            7,
            "What is the event loop in Node.js?",
            &["nodejs-express-backend.txt"],
            &["event loop", "asynchronous", "non-blocking", "callbacks"],
        ),
        TestCase::new(
            8,
            "How do you optimize images for web performance?",
            &["web-performance-optimization.txt"],
            &["image optimization", "WebP", "AVIF", "lazy loading", "responsive images"],
        ),
        TestCase::new(
            9,
            "What are custom hooks in React?",
            &["react-hooks-guide.txt"],
            &["custom hooks", "reusable", "use", "component logic"],
        ),
        TestCase::new(
            10,
            "How do you create responsive layouts with CSS Grid?",
            &["css-grid-flexbox.txt"],
            &["responsive", "auto-fit", "auto-fill", "minmax", "media queries"],
        ),
    ]
}

pub fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let raw = fs::read(path)
        .map_err(|err| RagError::io(format!("failed to read {}", path.display()), err))?;
    let cases: Vec<TestCase> = serde_json::from_slice(&raw)
        .map_err(|err| RagError::serialization(format!("failed to parse {}", path.display()), err))?;
    normalize_test_cases(cases)
}

/// Cases without an id are numbered after the largest explicit id, in file
/// order. Duplicate ids and cases that could not be scored are rejected.
pub fn normalize_test_cases(cases: Vec<TestCase>) -> Result<Vec<TestCase>> {
    let mut next_id = cases.iter().map(|case| case.id).max().unwrap_or(0) + 1;
    let mut seen_ids = HashSet::<u32>::with_capacity(cases.len());
    let mut out = Vec::<TestCase>::with_capacity(cases.len());

    for mut case in cases {
        if case.id == 0 {
            case.id = next_id;
            next_id += 1;
        }
        if !seen_ids.insert(case.id) {
            return Err(RagError::Configuration(format!(
                "test case id {} is used more than once",
                case.id
            )));
        }

        case.question = case.question.trim().to_string();
        dedup_preserving_order(&mut case.expected_sources);
        dedup_preserving_order(&mut case.expected_keywords);

        if case.question.is_empty() {
            return Err(RagError::Configuration(format!(
                "test case {} has an empty question",
                case.id
            )));
        }
        if case.expected_sources.is_empty() || case.expected_keywords.is_empty() {
            return Err(RagError::Configuration(format!(
                "test case {} needs at least one expected source and keyword",
                case.id
            )));
        }
        out.push(case);
    }
    Ok(out)
}

fn dedup_preserving_order(values: &mut Vec<String>) {
    let mut seen = Vec::<String>::with_capacity(values.len());
    values.retain(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() || seen.iter().any(|existing| existing == trimmed) {
            return false;
        }
        seen.push(trimmed.to_string());
        true
    });
    for value in values.iter_mut() {
        *value = value.trim().to_string();
    }
}
