pub mod assistant;
pub mod config;
pub mod dataset;
pub mod embed;
pub mod error;
pub mod eval;
pub mod generate;
pub mod ingest;
pub mod knowledge;
pub mod minilm_embed;
pub mod model;
pub mod retrieval;
pub mod storage;

pub use assistant::Assistant;
pub use config::{
    AssistantConfig, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_DIM, DEFAULT_FALLBACK_RETRIES,
    DEFAULT_FALLBACK_TIMEOUT_SECS, DEFAULT_OPENAI_BASE_URL, DEFAULT_REQUIRED_PASS_RATE,
    DEFAULT_THRESHOLD, GENERIC_FAILURE_MESSAGE, MAX_FALLBACK_RETRIES, SUPPORT_SYSTEM_PROMPT,
};
pub use dataset::{builtin_faqs, load_faq_jsonl};
pub use embed::{load_embedder, EmbeddingProvider, HashEmbeddingProvider};
pub use error::{FaqError, Result};
pub use eval::{evaluate_cases, read_eval_cases_json, EvalCase, EvalOutcome, EvalSummary};
pub use generate::{ChatMessage, Generator, OpenAiChatGenerator, Role};
pub use ingest::{
    collect_documents, ingest_directory, IngestReport, ParquetVectorStore, SourceDocument,
    VectorRecord, DEFAULT_COLLECTION,
};
pub use knowledge::{load_knowledge_base, KnowledgeBase, KnowledgeSource};
pub use minilm_embed::{MiniLmEmbeddingProvider, MINILM_MODEL_ID};
pub use model::{Answer, AnswerSource, Decision, FaqEntry, FaqRecord, RetrievalMatch};
pub use retrieval::{cosine_similarity, decide, top_match};
pub use storage::{load_index_jsonl, save_index_jsonl};
