//! Chat-completion fallback for questions the FAQ set cannot answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::{DEFAULT_CHAT_MODEL, DEFAULT_OPENAI_BASE_URL};
use crate::error::{FaqError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// "conversation messages -> generated text". Failures surface as
/// [`FaqError::FallbackUnavailable`].
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatGenerator {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiChatGenerator {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_endpoint(api_key, DEFAULT_OPENAI_BASE_URL, DEFAULT_CHAT_MODEL, None)
    }

    /// `request_timeout` bounds a single HTTP exchange inside the client.
    pub fn with_endpoint(
        api_key: impl Into<String>,
        base_url: &str,
        model: &str,
        request_timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(FaqError::Config("OpenAI API key is empty".to_string()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| FaqError::Config(format!("build http client: {e}")))?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Generator for OpenAiChatGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, messages = messages.len(), "calling chat completions");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages,
            })
            .send()
            .await
            .map_err(|e| FaqError::FallbackUnavailable(format!("request to {url} failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(FaqError::FallbackUnavailable(format!(
                "chat completions returned {status}: {text}"
            )));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| FaqError::FallbackUnavailable(format!("malformed completion: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| FaqError::FallbackUnavailable("completion had no content".to_string()))
    }
}
