use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A curated question/answer pair before it has been embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqRecord {
    pub id: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub featured: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqEntry {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    #[serde(default)]
    pub featured: bool,
    pub indexed_at: DateTime<Utc>,
}

impl FaqEntry {
    pub fn from_record(record: FaqRecord, embedding: Vec<f32>, embedding_model: &str) -> Self {
        Self {
            id: record.id,
            question: record.question,
            answer: record.answer,
            embedding,
            embedding_model: embedding_model.to_string(),
            featured: record.featured,
            indexed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Hit,
    Miss,
}

/// Outcome of matching one query against the knowledge base. `entry_id` is
/// always the nearest entry; `answer` is only set on a hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub entry_id: String,
    pub answer: Option<String>,
    pub score: f32,
    pub decision: Decision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerSource {
    Faq { entry_id: String, score: f32 },
    Generated { best_score: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
}

impl Answer {
    pub fn is_generated(&self) -> bool {
        matches!(self.source, AnswerSource::Generated { .. })
    }
}
