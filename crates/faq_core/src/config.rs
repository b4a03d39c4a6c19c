use std::time::Duration;

/// Similarity a match must strictly exceed to be served without the fallback.
pub const DEFAULT_THRESHOLD: f32 = 0.65;
pub const DEFAULT_EMBEDDING_DIM: usize = 384;
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const SUPPORT_SYSTEM_PROMPT: &str = "You are a telecom customer support assistant.";
pub const DEFAULT_FALLBACK_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FALLBACK_RETRIES: u32 = 1;
pub const MAX_FALLBACK_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
pub const DEFAULT_REQUIRED_PASS_RATE: f32 = 0.85;

/// Message shown to end users when the fallback generator could not answer.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Sorry, I couldn't get an answer right now. Please try again in a moment.";

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub threshold: f32,
    pub system_prompt: String,
    pub fallback_timeout: Duration,
    pub fallback_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            system_prompt: SUPPORT_SYSTEM_PROMPT.to_string(),
            fallback_timeout: Duration::from_secs(DEFAULT_FALLBACK_TIMEOUT_SECS),
            fallback_retries: DEFAULT_FALLBACK_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

impl AssistantConfig {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !self.threshold.is_finite() || !(-1.0..=1.0).contains(&self.threshold) {
            return Err(crate::FaqError::Config(format!(
                "threshold must be within [-1, 1], got {}",
                self.threshold
            )));
        }
        if self.fallback_timeout.is_zero() {
            return Err(crate::FaqError::Config(
                "fallback timeout must be > 0".to_string(),
            ));
        }
        if self.fallback_retries > MAX_FALLBACK_RETRIES {
            return Err(crate::FaqError::Config(format!(
                "fallback retries must be at most {MAX_FALLBACK_RETRIES}, got {}",
                self.fallback_retries
            )));
        }
        if self.system_prompt.trim().is_empty() {
            return Err(crate::FaqError::Config(
                "system prompt must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
