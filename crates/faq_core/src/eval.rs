//! Labeled-question evaluation of the match threshold. Only the embed + match
//! path runs; the fallback generator is never called.

use crate::embed::EmbeddingProvider;
use crate::knowledge::KnowledgeBase;
use crate::model::Decision;
use crate::retrieval::decide;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCase {
    pub case_id: String,
    pub question: String,
    pub expected_decision: Decision,
    pub expected_faq_id: Option<String>,
    pub min_similarity: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalOutcome {
    pub case_id: String,
    pub passed: bool,
    pub actual_decision: Decision,
    pub nearest_faq_id: String,
    pub score: f32,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f32,
    pub outcomes: Vec<EvalOutcome>,
}

impl EvalSummary {
    pub fn meets(&self, required_pass_rate: f32) -> bool {
        self.total > 0 && self.pass_rate >= required_pass_rate
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let total: f64 = self.outcomes.iter().map(|o| o.latency_ms).sum();
        total / self.outcomes.len().max(1) as f64
    }
}

pub fn read_eval_cases_json(path: &Path) -> Result<Vec<EvalCase>> {
    let file = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    serde_json::from_reader(file).context("parse eval cases json")
}

fn case_passed(case: &EvalCase, decision: Decision, faq_id: &str, score: f32) -> bool {
    if case.expected_decision != decision {
        return false;
    }
    // The nearest id only matters when the case expects a direct answer.
    if decision == Decision::Hit {
        if let Some(expected) = &case.expected_faq_id {
            if expected != faq_id {
                return false;
            }
        }
    }
    case.min_similarity.map_or(true, |min| score >= min)
}

pub fn evaluate_cases(
    embedder: &dyn EmbeddingProvider,
    kb: &KnowledgeBase,
    cases: &[EvalCase],
    threshold: f32,
) -> Result<EvalSummary> {
    let mut outcomes = Vec::with_capacity(cases.len());

    for case in cases {
        let start = Instant::now();
        let query = embedder
            .embed(&case.question)
            .with_context(|| format!("case {}: embed question", case.case_id))?;
        let result = decide(&query, kb, threshold)?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        outcomes.push(EvalOutcome {
            case_id: case.case_id.clone(),
            passed: case_passed(case, result.decision, &result.entry_id, result.score),
            actual_decision: result.decision,
            nearest_faq_id: result.entry_id,
            score: result.score,
            latency_ms,
        });
    }

    let total = outcomes.len();
    let passed = outcomes.iter().filter(|o| o.passed).count();
    let pass_rate = if total == 0 {
        0.0
    } else {
        passed as f32 / total as f32
    };

    Ok(EvalSummary {
        total,
        passed,
        failed: total - passed,
        pass_rate,
        outcomes,
    })
}
