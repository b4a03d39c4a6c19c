use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use faq_core::{
    load_embedder, load_knowledge_base, Assistant, AssistantConfig, EmbeddingProvider, FaqError,
    KnowledgeSource, OpenAiChatGenerator, DEFAULT_CHAT_MODEL, DEFAULT_FALLBACK_RETRIES,
    DEFAULT_FALLBACK_TIMEOUT_SECS, DEFAULT_OPENAI_BASE_URL, DEFAULT_THRESHOLD,
};
use tracing::info;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "faq-server",
    version,
    about = "Telecom FAQ assistant: canned answers for known questions, LLM fallback otherwise"
)]
pub struct ServerArgs {
    #[arg(long, env = "FAQ_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// FAQ dataset (JSONL). Defaults to the built-in telecom FAQs.
    #[arg(long, env = "FAQ_DATASET")]
    pub dataset: Option<PathBuf>,

    /// Prebuilt index from `faq build-index`; takes precedence over --dataset.
    #[arg(long, env = "FAQ_INDEX")]
    pub index: Option<PathBuf>,

    /// all-MiniLM-L6-v2 .safetensors weights. Without it the hashing embedder is used.
    #[arg(long, env = "FAQ_MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    #[arg(long, env = "FAQ_TOKENIZER_PATH")]
    pub tokenizer_path: Option<PathBuf>,

    #[arg(long, env = "FAQ_THRESHOLD", default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f32,

    #[arg(long, env = "FAQ_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    pub openai_base_url: String,

    #[arg(long, env = "FAQ_FALLBACK_TIMEOUT_SECS", default_value_t = DEFAULT_FALLBACK_TIMEOUT_SECS)]
    pub fallback_timeout_secs: u64,

    #[arg(long, env = "FAQ_FALLBACK_RETRIES", default_value_t = DEFAULT_FALLBACK_RETRIES)]
    pub fallback_retries: u32,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
}

impl ServerArgs {
    pub fn api_key(&self) -> faq_core::Result<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| FaqError::Config("OPENAI_API_KEY is missing or empty".to_string()))
    }

    pub fn assistant_config(&self) -> AssistantConfig {
        AssistantConfig {
            fallback_timeout: Duration::from_secs(self.fallback_timeout_secs),
            fallback_retries: self.fallback_retries,
            ..AssistantConfig::default()
        }
        .with_threshold(self.threshold)
    }

    pub fn knowledge_source(&self) -> KnowledgeSource {
        KnowledgeSource::resolve(self.dataset.clone(), self.index.clone())
    }

    /// Assemble every startup resource. Any error here means the server must
    /// not start.
    pub fn build_assistant(&self) -> Result<Assistant> {
        let api_key = self.api_key()?;
        let config = self.assistant_config();
        config.validate()?;

        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(load_embedder(
            self.model_path.as_deref(),
            self.tokenizer_path.as_deref(),
        )?);
        let kb = load_knowledge_base(&self.knowledge_source(), embedder.as_ref())
            .context("load knowledge base")?;

        let generator = OpenAiChatGenerator::with_endpoint(
            api_key,
            &self.openai_base_url,
            &self.chat_model,
            Some(config.fallback_timeout),
        )?;
        info!(
            chat_model = generator.model(),
            base_url = %self.openai_base_url,
            "fallback generator configured"
        );

        Ok(Assistant::new(kb, embedder, Arc::new(generator), config)?)
    }
}
