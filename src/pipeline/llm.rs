//! Extraction client: send one page image plus the extraction prompt to a
//! vision model and return its raw text reply.
//!
//! The model sits behind the [`VisionModel`] trait. [`LlmVisionModel`]
//! adapts any `edgequake_llm` provider (Gemini, OpenAI, Anthropic, Ollama …);
//! tests and embedders can plug in their own implementation through
//! [`crate::config::ExtractionConfig::vision_model`].
//!
//! ## Retry and timeout
//!
//! Both are off by default: one call, no deadline. `max_retries` enables
//! exponential backoff (`retry_backoff_ms * 2^(retry - 1)`, capped at
//! [`MAX_BACKOFF_MS`]) and
//! `api_timeout_secs` bounds each attempt.

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::prompts::{extraction_prompt, STRICT_JSON_INSTRUCTION};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Longest wait between two attempts.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Error type returned by [`VisionModel`] implementations.
pub type ModelError = Box<dyn std::error::Error + Send + Sync>;

/// Everything sent to the model for one image.
#[derive(Clone)]
pub struct VisionRequest {
    /// Extra system instruction (the strict-JSON contract), if any.
    pub system: Option<String>,
    /// The extraction prompt, sent in the same user turn as the image.
    pub prompt: String,
    pub image: ImageData,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Raw reply text plus token usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// A multimodal model that turns an image plus instructions into text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete(&self, request: &VisionRequest) -> Result<ModelReply, ModelError>;
}

/// [`VisionModel`] backed by an `edgequake_llm` provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl VisionModel for LlmVisionModel {
    async fn complete(&self, request: &VisionRequest) -> Result<ModelReply, ModelError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage::system(system.as_str()));
        }
        messages.push(ChatMessage::user_with_images(
            request.prompt.as_str(),
            vec![request.image.clone()],
        ));

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ModelError::from(e.to_string()))?;

        Ok(ModelReply {
            text: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }
}

/// Assemble the request for one image from the batch config.
pub fn build_request(image: ImageData, config: &ExtractionConfig) -> VisionRequest {
    VisionRequest {
        system: config
            .strict_json
            .then(|| STRICT_JSON_INSTRUCTION.to_string()),
        prompt: extraction_prompt(config.prompt.as_deref()).to_string(),
        image,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

/// Delay before retry number `retry` (1-based), saturating instead of
/// overflowing for large retry counts.
pub fn backoff_ms(base_ms: u64, retry: u32) -> u64 {
    let factor = 2u64.saturating_pow(retry.saturating_sub(1));
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

/// Call the model for image `index` (1-based), honouring the configured
/// retries and per-attempt timeout.
pub async fn request_extraction(
    model: &dyn VisionModel,
    index: usize,
    request: &VisionRequest,
    config: &ExtractionConfig,
) -> Result<ModelReply, ExtractionError> {
    let mut last_err = ExtractionError::ModelCallFailed {
        image: index,
        retries: 0,
        detail: "no attempt made".to_string(),
    };

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Image {}: retry {}/{} after {}ms",
                index, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let call = model.complete(request);
        let outcome = match config.api_timeout_secs {
            Some(secs) => match timeout(Duration::from_secs(secs), call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Image {}: attempt {} timed out after {}s", index, attempt + 1, secs);
                    last_err = ExtractionError::Timeout { image: index, secs };
                    continue;
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(reply) => {
                debug!(
                    "Image {}: {} input tokens, {} output tokens, {} chars",
                    index,
                    reply.input_tokens,
                    reply.output_tokens,
                    reply.text.len()
                );
                return Ok(reply);
            }
            Err(e) => {
                warn!("Image {}: attempt {} failed: {}", index, attempt + 1, e);
                last_err = ExtractionError::ModelCallFailed {
                    image: index,
                    retries: attempt,
                    detail: e.to_string(),
                };
            }
        }
    }

    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times, then answers `reply`.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        reply: &'static str,
    }

    #[async_trait]
    impl VisionModel for Flaky {
        async fn complete(&self, _request: &VisionRequest) -> Result<ModelReply, ModelError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err("503 service unavailable".into());
            }
            Ok(ModelReply {
                text: self.reply.to_string(),
                ..Default::default()
            })
        }
    }

    struct Hangs;

    #[async_trait]
    impl VisionModel for Hangs {
        async fn complete(&self, _request: &VisionRequest) -> Result<ModelReply, ModelError> {
            sleep(Duration::from_secs(30)).await;
            Ok(ModelReply::default())
        }
    }

    fn image() -> ImageData {
        crate::pipeline::encode::encode_bytes(b"png", "image/png")
    }

    #[test]
    fn build_request_respects_strict_flag_and_prompt_override() {
        let strict = ExtractionConfig::default();
        let req = build_request(image(), &strict);
        assert_eq!(req.system.as_deref(), Some(STRICT_JSON_INSTRUCTION));
        assert!(req.prompt.contains("workout"));
        assert_eq!(req.max_tokens, 4096);

        let loose = ExtractionConfig::builder()
            .strict_json(false)
            .prompt("Only the date please")
            .build()
            .unwrap();
        let req = build_request(image(), &loose);
        assert!(req.system.is_none());
        assert_eq!(req.prompt, "Only the date please");
    }

    #[test]
    fn single_attempt_by_default() {
        let model = Flaky {
            failures: 1,
            calls: AtomicU32::new(0),
            reply: "{}",
        };
        let config = ExtractionConfig::default();
        let req = build_request(image(), &config);

        let err = tokio_test::block_on(request_extraction(&model, 2, &req, &config)).unwrap_err();
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ExtractionError::ModelCallFailed { image: 2, retries: 0, .. }));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let model = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
            reply: "{\"workouts\": []}",
        };
        let config = ExtractionConfig::builder()
            .max_retries(3)
            .retry_backoff_ms(1)
            .build()
            .unwrap();
        let req = build_request(image(), &config);

        let reply = request_extraction(&model, 1, &req, &config).await.unwrap();
        assert_eq!(reply.text, "{\"workouts\": []}");
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let config = ExtractionConfig::builder().api_timeout_secs(1).build().unwrap();
        let req = build_request(image(), &config);

        let err = request_extraction(&Hangs, 4, &req, &config).await.unwrap_err();
        assert_eq!(err, ExtractionError::Timeout { image: 4, secs: 1 });
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1_000);
        assert_eq!(backoff_ms(500, 4), 4_000);
        assert_eq!(backoff_ms(500, 70), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(u64::MAX, 3), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(0, 200), 0);
    }

    #[tokio::test]
    async fn many_retries_do_not_overflow() {
        let model = Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
            reply: "{}",
        };
        let config = ExtractionConfig::builder()
            .max_retries(70)
            .retry_backoff_ms(0)
            .build()
            .unwrap();
        let req = build_request(image(), &config);

        let err = request_extraction(&model, 1, &req, &config).await.unwrap_err();
        assert_eq!(model.calls.load(Ordering::SeqCst), 71);
        assert!(matches!(err, ExtractionError::ModelCallFailed { retries: 70, .. }));
    }
}
