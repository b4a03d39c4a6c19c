use anyhow::{bail, Result};
use std::path::Path;
use tracing::info;

use crate::config::DEFAULT_EMBEDDING_DIM;
use crate::minilm_embed::MiniLmEmbeddingProvider;

pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Identifies the embedding function; vectors from different ids are never compared.
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;
}

impl EmbeddingProvider for Box<dyn EmbeddingProvider> {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }
}

/// Bag-of-tokens embedder: each token is FNV-1a hashed into a bucket and the
/// counts are L2-normalized. Deterministic and model-free.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dim: usize,
    model_id: String,
}

impl HashEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(8);
        Self {
            dim,
            model_id: format!("hash-{dim}"),
        }
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dim];

        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut h: u64 = 0xcbf29ce484222325;
            for b in token.as_bytes() {
                h ^= *b as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % self.dim as u64) as usize] += 1.0;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }

        Ok(v)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// MiniLM when both files are given, the hashing embedder when neither is.
pub fn load_embedder(
    model_path: Option<&Path>,
    tokenizer_path: Option<&Path>,
) -> Result<Box<dyn EmbeddingProvider>> {
    match (model_path, tokenizer_path) {
        (Some(model), Some(tokenizer)) => {
            let ext = model.extension().and_then(|e| e.to_str()).unwrap_or("");
            if ext != "safetensors" {
                bail!("unsupported model format '.{ext}' (expected .safetensors)");
            }
            info!(model = %model.display(), "loading MiniLM embedder");
            let provider = MiniLmEmbeddingProvider::load(model, tokenizer)?;
            info!(dim = provider.dimension(), "embedder ready");
            Ok(Box::new(provider))
        }
        (None, None) => {
            info!(
                dim = DEFAULT_EMBEDDING_DIM,
                "no model configured, using hashing embedder"
            );
            Ok(Box::new(HashEmbeddingProvider::new(DEFAULT_EMBEDDING_DIM)))
        }
        _ => bail!("--model-path and --tokenizer-path must both be provided"),
    }
}
