//! Question handling: embed, match against the knowledge base, and fall back
//! to the generator when no FAQ entry is a confident match.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AssistantConfig;
use crate::embed::EmbeddingProvider;
use crate::error::{FaqError, Result};
use crate::generate::{ChatMessage, Generator};
use crate::knowledge::KnowledgeBase;
use crate::model::{Answer, AnswerSource, Decision, RetrievalMatch};
use crate::retrieval::decide;

/// Shared, read-only request handler. Cheap to clone.
#[derive(Clone)]
pub struct Assistant {
    kb: Arc<KnowledgeBase>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
    config: Arc<AssistantConfig>,
}

impl Assistant {
    pub fn new(
        kb: KnowledgeBase,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
        config: AssistantConfig,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.model_id() != kb.model_id() {
            return Err(FaqError::ModelMismatch {
                entry_id: kb.entries().first().map(|e| e.id.clone()).unwrap_or_default(),
                indexed: kb.model_id().to_string(),
                live: embedder.model_id().to_string(),
            });
        }
        if embedder.dimension() != kb.dimension() {
            return Err(FaqError::DimensionMismatch {
                context: "query embedder".to_string(),
                expected: kb.dimension(),
                actual: embedder.dimension(),
            });
        }

        Ok(Self {
            kb: Arc::new(kb),
            embedder,
            generator,
            config: Arc::new(config),
        })
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub async fn handle(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(FaqError::InvalidQuestion(
                "question must not be empty".to_string(),
            ));
        }

        let result = self.match_question(question).await?;
        match result.decision {
            Decision::Hit => {
                info!(faq_id = %result.entry_id, score = result.score, "answered from faq");
                Ok(Answer {
                    text: result.answer.unwrap_or_default(),
                    source: AnswerSource::Faq {
                        entry_id: result.entry_id,
                        score: result.score,
                    },
                })
            }
            Decision::Miss => {
                info!(
                    nearest = %result.entry_id,
                    score = result.score,
                    "no confident faq match, using fallback"
                );
                let text = self.fallback(question).await?;
                Ok(Answer {
                    text,
                    source: AnswerSource::Generated {
                        best_score: result.score,
                    },
                })
            }
        }
    }

    /// Embedding and matching only; never calls the generator.
    pub async fn match_question(&self, question: &str) -> Result<RetrievalMatch> {
        let embedder = Arc::clone(&self.embedder);
        let text = question.to_string();
        let query = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| FaqError::Embedding(format!("embedding task failed: {e}")))?
            .map_err(|e| FaqError::Embedding(format!("{e:#}")))?;

        decide(&query, &self.kb, self.config.threshold)
    }

    /// Ask the generator, bounded by the configured timeout and retried with
    /// doubling backoff. Returns trimmed text.
    pub async fn fallback(&self, question: &str) -> Result<String> {
        let messages = [
            ChatMessage::system(self.config.system_prompt.clone()),
            ChatMessage::user(question),
        ];
        let attempts = self.config.fallback_retries.saturating_add(1);
        let mut backoff = self.config.retry_backoff;
        let mut last_err = None;

        for attempt in 1..=attempts {
            let generation = self.generator.generate(&messages);
            let outcome = tokio::time::timeout(self.config.fallback_timeout, generation)
                .await
                .unwrap_or_else(|_| {
                    Err(FaqError::FallbackUnavailable(format!(
                        "{} timed out after {:?}",
                        self.generator.name(),
                        self.config.fallback_timeout
                    )))
                });

            match outcome {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(attempt, generator = self.generator.name(), "fallback answered");
                    return Ok(text.trim().to_string());
                }
                Ok(_) => {
                    last_err = Some(FaqError::FallbackUnavailable(
                        "generator returned an empty answer".to_string(),
                    ));
                }
                Err(e) => last_err = Some(e),
            }

            if attempt < attempts {
                if let Some(err) = &last_err {
                    warn!(
                        attempt,
                        error = %err,
                        "fallback attempt failed, retrying in {backoff:?}"
                    );
                }
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        let err = match last_err {
            Some(FaqError::FallbackUnavailable(msg)) => FaqError::FallbackUnavailable(msg),
            Some(other) => FaqError::FallbackUnavailable(other.to_string()),
            None => FaqError::FallbackUnavailable("no attempts made".to_string()),
        };
        warn!(error = %err, "fallback gave up");
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FALLBACK_RETRIES;
    use crate::dataset::builtin_faqs;
    use crate::embed::HashEmbeddingProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedGenerator {
        calls: AtomicUsize,
        failures_before_success: usize,
        reply: &'static str,
        delay: Option<Duration>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedGenerator {
        fn answering() -> Self {
            Self::failing_first(0)
        }

        fn failing_first(n: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures_before_success: n,
                reply: "  I can only help with telecom questions.  \n",
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(messages.to_vec());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if n < self.failures_before_success {
                return Err(FaqError::FallbackUnavailable("quota exceeded".to_string()));
            }
            Ok(self.reply.to_string())
        }
    }

    fn config() -> AssistantConfig {
        AssistantConfig {
            retry_backoff: Duration::from_millis(1),
            ..AssistantConfig::default()
        }
    }

    fn assistant(generator: Arc<ScriptedGenerator>, config: AssistantConfig) -> Assistant {
        let embedder = Arc::new(HashEmbeddingProvider::new(384));
        let kb = KnowledgeBase::embed_records(builtin_faqs().unwrap(), embedder.as_ref()).unwrap();
        Assistant::new(kb, embedder, generator, config).unwrap()
    }

    #[tokio::test]
    async fn known_question_is_answered_from_the_faq() {
        let generator = Arc::new(ScriptedGenerator::answering());
        let assistant = assistant(generator.clone(), config());

        let answer = assistant
            .handle("How can I recharge my mobile balance?")
            .await
            .unwrap();

        assert_eq!(
            answer.text,
            "You can recharge via scratch card, mobile app, or USSD code *123#."
        );
        match answer.source {
            AnswerSource::Faq { entry_id, score } => {
                assert_eq!(entry_id, "recharge-balance");
                assert!((score - 1.0).abs() < 1e-5);
            }
            other => panic!("expected faq answer, got {other:?}"),
        }
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn unrelated_question_uses_the_fallback() {
        let generator = Arc::new(ScriptedGenerator::answering());
        let assistant = assistant(generator.clone(), config());

        let answer = assistant.handle("What's the weather today?").await.unwrap();

        assert!(answer.is_generated());
        assert_eq!(answer.text, "I can only help with telecom questions.");
        assert_eq!(generator.calls(), 1);

        let seen = generator.seen.lock().unwrap();
        assert_eq!(
            seen[0],
            vec![
                ChatMessage::system("You are a telecom customer support assistant."),
                ChatMessage::user("What's the weather today?"),
            ]
        );
    }

    #[tokio::test]
    async fn matching_is_deterministic() {
        let assistant = assistant(Arc::new(ScriptedGenerator::answering()), config());
        let question = "How to pay my postpaid bill";
        let a = assistant.match_question(question).await.unwrap();
        let b = assistant.match_question(question).await.unwrap();
        assert_eq!(a.entry_id, b.entry_id);
        assert_eq!(a.score, b.score);
        assert_eq!(a.entry_id, "postpaid-bill");
    }

    #[tokio::test]
    async fn blank_question_is_rejected_before_embedding() {
        let generator = Arc::new(ScriptedGenerator::answering());
        let assistant = assistant(generator.clone(), config());

        let err = assistant.handle("   \n\t").await.unwrap_err();
        assert!(matches!(err, FaqError::InvalidQuestion(_)));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn fallback_retries_once_then_succeeds() {
        let generator = Arc::new(ScriptedGenerator::failing_first(1));
        let assistant = assistant(generator.clone(), config());

        let answer = assistant.handle("What's the weather today?").await.unwrap();
        assert!(answer.is_generated());
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn fallback_failure_is_distinguishable() {
        let generator = Arc::new(ScriptedGenerator::failing_first(usize::MAX));
        let assistant = assistant(generator.clone(), config());

        let err = assistant.handle("What's the weather today?").await.unwrap_err();
        assert!(matches!(err, FaqError::FallbackUnavailable(_)));
        assert!(!err.is_startup_fatal());
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn blank_completion_counts_as_failure() {
        let generator = Arc::new(ScriptedGenerator {
            reply: "  ",
            ..ScriptedGenerator::answering()
        });
        let assistant = assistant(generator.clone(), config());

        let err = assistant.handle("What's the weather today?").await.unwrap_err();
        match err {
            FaqError::FallbackUnavailable(msg) => assert!(msg.contains("empty answer")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(generator.calls(), DEFAULT_FALLBACK_RETRIES as usize + 1);
    }

    #[test]
    fn unbounded_retries_are_rejected_at_construction() {
        let embedder = Arc::new(HashEmbeddingProvider::new(384));
        let kb = KnowledgeBase::embed_records(builtin_faqs().unwrap(), embedder.as_ref()).unwrap();
        let cfg = AssistantConfig {
            fallback_retries: u32::MAX,
            retry_backoff: Duration::ZERO,
            ..AssistantConfig::default()
        };

        let err = Assistant::new(kb, embedder, Arc::new(ScriptedGenerator::answering()), cfg)
            .err()
            .expect("retry count above the cap must fail");
        assert!(matches!(err, FaqError::Config(_)));
    }

    #[tokio::test]
    async fn slow_generator_times_out() {
        let generator = Arc::new(ScriptedGenerator {
            delay: Some(Duration::from_millis(200)),
            ..ScriptedGenerator::answering()
        });
        let cfg = AssistantConfig {
            fallback_timeout: Duration::from_millis(20),
            fallback_retries: 0,
            ..config()
        };
        let assistant = assistant(generator, cfg);

        let err = assistant.fallback("anything").await.unwrap_err();
        match err {
            FaqError::FallbackUnavailable(msg) => assert!(msg.contains("timed out")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn embedder_must_match_knowledge_base() {
        let kb = KnowledgeBase::embed_records(
            builtin_faqs().unwrap(),
            &HashEmbeddingProvider::new(64),
        )
        .unwrap();
        let err = Assistant::new(
            kb,
            Arc::new(HashEmbeddingProvider::new(128)),
            Arc::new(ScriptedGenerator::answering()),
            AssistantConfig::default(),
        )
        .err()
        .expect("mismatched embedder must fail");
        match err {
            FaqError::ModelMismatch { indexed, live, .. } => {
                assert_eq!(indexed, "hash-64");
                assert_eq!(live, "hash-128");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
