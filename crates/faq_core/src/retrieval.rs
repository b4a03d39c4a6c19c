use crate::error::{FaqError, Result};
use crate::knowledge::KnowledgeBase;
use crate::model::{Decision, FaqEntry, RetrievalMatch};

/// Cosine similarity of two vectors. Empty, mismatched, zero-norm or
/// non-finite inputs score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, na, nb) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, aa, bb), (x, y)| {
            (d + (x * y), aa + (x * x), bb + (y * y))
        });

    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let sim = dot / (na.sqrt() * nb.sqrt());
    if sim.is_finite() {
        sim
    } else {
        0.0
    }
}

/// Nearest entry by cosine similarity. Ties go to the earliest entry.
pub fn top_match<'a>(
    query_embedding: &[f32],
    entries: &'a [FaqEntry],
) -> Option<(&'a FaqEntry, f32)> {
    let mut scored = entries
        .iter()
        .map(|entry| (entry, cosine_similarity(query_embedding, &entry.embedding)));

    let first = scored.next()?;
    Some(scored.fold(first, |best, candidate| {
        if candidate.1 > best.1 {
            candidate
        } else {
            best
        }
    }))
}

/// Match a query against the knowledge base. A hit requires the best score to
/// strictly exceed `threshold`.
pub fn decide(
    query_embedding: &[f32],
    kb: &KnowledgeBase,
    threshold: f32,
) -> Result<RetrievalMatch> {
    if query_embedding.len() != kb.dimension() {
        return Err(FaqError::DimensionMismatch {
            context: "query embedding".to_string(),
            expected: kb.dimension(),
            actual: query_embedding.len(),
        });
    }

    let (entry, score) =
        top_match(query_embedding, kb.entries()).ok_or(FaqError::EmptyKnowledgeBase)?;

    Ok(if score > threshold {
        RetrievalMatch {
            entry_id: entry.id.clone(),
            answer: Some(entry.answer.clone()),
            score,
            decision: Decision::Hit,
        }
    } else {
        RetrievalMatch {
            entry_id: entry.id.clone(),
            answer: None,
            score,
            decision: Decision::Miss,
        }
    })
}
