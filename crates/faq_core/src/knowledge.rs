use anyhow::Context;
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::info;

use crate::dataset::{builtin_faqs, load_faq_jsonl};
use crate::embed::EmbeddingProvider;
use crate::error::{FaqError, Result};
use crate::model::{FaqEntry, FaqRecord};
use crate::storage::load_index_jsonl;

/// Where the knowledge base comes from at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeSource {
    /// The dataset compiled into this crate.
    Builtin,
    /// A FAQ dataset JSONL file, embedded at startup.
    Dataset(PathBuf),
    /// A prebuilt index JSONL file; must match the live embedder.
    Index(PathBuf),
}

impl KnowledgeSource {
    /// An index takes precedence over a dataset; neither means the built-in set.
    pub fn resolve(dataset: Option<PathBuf>, index: Option<PathBuf>) -> Self {
        match (index, dataset) {
            (Some(index), _) => KnowledgeSource::Index(index),
            (None, Some(dataset)) => KnowledgeSource::Dataset(dataset),
            (None, None) => KnowledgeSource::Builtin,
        }
    }
}

pub fn load_knowledge_base(
    source: &KnowledgeSource,
    embedder: &dyn EmbeddingProvider,
) -> anyhow::Result<KnowledgeBase> {
    let kb = match source {
        KnowledgeSource::Builtin => KnowledgeBase::embed_records(builtin_faqs()?, embedder)?,
        KnowledgeSource::Dataset(path) => {
            KnowledgeBase::embed_records(load_faq_jsonl(path)?, embedder)
                .with_context(|| format!("embed dataset {}", path.display()))?
        }
        KnowledgeSource::Index(path) => {
            KnowledgeBase::from_index(load_index_jsonl(path)?, embedder)
                .with_context(|| format!("validate index {}", path.display()))?
        }
    };
    Ok(kb)
}

/// Read-only set of embedded FAQ entries. Construction guarantees at least one
/// entry and a single embedding model and dimension across all of them.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entries: Vec<FaqEntry>,
    model_id: String,
    dimension: usize,
}

impl KnowledgeBase {
    /// Embed every question of `records` with `embedder`.
    pub fn embed_records(
        records: Vec<FaqRecord>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(FaqError::EmptyKnowledgeBase);
        }

        let embeddings = records
            .par_iter()
            .map(|r| {
                embedder
                    .embed(&r.question)
                    .map_err(|e| FaqError::Embedding(format!("faq {}: {e:#}", r.id)))
            })
            .collect::<Result<Vec<_>>>()?;

        let entries = records
            .into_iter()
            .zip(embeddings)
            .map(|(record, embedding)| {
                FaqEntry::from_record(record, embedding, embedder.model_id())
            })
            .collect();

        let kb = Self::from_parts(entries, embedder.model_id(), embedder.dimension())?;
        info!(
            entries = kb.len(),
            model = %kb.model_id,
            dim = kb.dimension,
            "knowledge base embedded"
        );
        Ok(kb)
    }

    /// Adopt a prebuilt index, checking it was produced by `embedder`.
    pub fn from_index(entries: Vec<FaqEntry>, embedder: &dyn EmbeddingProvider) -> Result<Self> {
        let kb = Self::from_parts(entries, embedder.model_id(), embedder.dimension())?;
        info!(entries = kb.len(), model = %kb.model_id, "knowledge base loaded from index");
        Ok(kb)
    }

    pub fn from_parts(entries: Vec<FaqEntry>, model_id: &str, dimension: usize) -> Result<Self> {
        if entries.is_empty() {
            return Err(FaqError::EmptyKnowledgeBase);
        }
        if dimension == 0 {
            return Err(FaqError::Config("embedding dimension must be > 0".to_string()));
        }

        for entry in &entries {
            if entry.embedding_model != model_id {
                return Err(FaqError::ModelMismatch {
                    entry_id: entry.id.clone(),
                    indexed: entry.embedding_model.clone(),
                    live: model_id.to_string(),
                });
            }
            if entry.embedding.len() != dimension {
                return Err(FaqError::DimensionMismatch {
                    context: format!("faq entry {}", entry.id),
                    expected: dimension,
                    actual: entry.embedding.len(),
                });
            }
        }

        Ok(Self {
            entries,
            model_id: model_id.to_string(),
            dimension,
        })
    }

    pub fn entries(&self) -> &[FaqEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn featured_questions(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.featured)
            .map(|e| e.question.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbeddingProvider;

    #[test]
    fn embeds_builtin_dataset() {
        let embedder = HashEmbeddingProvider::new(384);
        let kb = KnowledgeBase::embed_records(builtin_faqs().unwrap(), &embedder).unwrap();

        assert_eq!(kb.len(), 19);
        assert_eq!(kb.dimension(), 384);
        assert_eq!(kb.model_id(), "hash-384");
        assert_eq!(kb.entries()[0].id, "recharge-balance");
        assert_eq!(kb.featured_questions().len(), 8);
    }

    #[test]
    fn index_source_wins_over_dataset() {
        let source =
            KnowledgeSource::resolve(Some("faqs.jsonl".into()), Some("index.jsonl".into()));
        assert_eq!(source, KnowledgeSource::Index("index.jsonl".into()));
        assert_eq!(KnowledgeSource::resolve(None, None), KnowledgeSource::Builtin);
    }

    #[test]
    fn empty_dataset_file_fails_fast() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let source = KnowledgeSource::Dataset(file.path().to_path_buf());
        let err = load_knowledge_base(&source, &HashEmbeddingProvider::new(32)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FaqError>(),
            Some(FaqError::EmptyKnowledgeBase)
        ));
    }

    #[test]
    fn empty_dataset_fails_fast() {
        let embedder = HashEmbeddingProvider::new(32);
        let err = KnowledgeBase::embed_records(Vec::new(), &embedder).unwrap_err();
        assert!(matches!(err, FaqError::EmptyKnowledgeBase));
        assert!(err.is_startup_fatal());
    }

    #[test]
    fn index_from_another_model_is_rejected() {
        let built_with = HashEmbeddingProvider::new(64);
        let kb = KnowledgeBase::embed_records(builtin_faqs().unwrap(), &built_with).unwrap();

        let live = HashEmbeddingProvider::new(128);
        let err = KnowledgeBase::from_index(kb.entries().to_vec(), &live).unwrap_err();
        assert!(matches!(err, FaqError::ModelMismatch { .. }));
    }

    #[test]
    fn index_with_wrong_dimension_is_rejected() {
        let embedder = HashEmbeddingProvider::new(64);
        let kb = KnowledgeBase::embed_records(builtin_faqs().unwrap(), &embedder).unwrap();
        let mut entries = kb.entries().to_vec();
        entries[3].embedding.truncate(10);

        let err = KnowledgeBase::from_index(entries, &embedder).unwrap_err();
        match err {
            FaqError::DimensionMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, 64);
                assert_eq!(actual, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
