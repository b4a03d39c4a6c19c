use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaqError {
    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Knowledge base is empty: at least one FAQ entry must be loaded")]
    EmptyKnowledgeBase,

    #[error("Embedding dimension mismatch ({context}): expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error(
        "Embedding model mismatch for entry {entry_id}: index built with {indexed}, embedder is {live}"
    )]
    ModelMismatch {
        entry_id: String,
        indexed: String,
        live: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Fallback unavailable: {0}")]
    FallbackUnavailable(String),
}

impl FaqError {
    /// Configuration or knowledge-base errors. The server reports these as
    /// startup failures rather than runtime faults.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            FaqError::EmptyKnowledgeBase
                | FaqError::DimensionMismatch { .. }
                | FaqError::ModelMismatch { .. }
                | FaqError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FaqError>;
