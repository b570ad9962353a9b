//! Generation parameters and the retrying call wrapper.
//!
//! [`GenerativeClient`] is the single path every model call in the crate
//! takes: it builds a [`GenerateRequest`], runs it through
//! [`with_backoff`](crate::backend::with_backoff), emits retry events and
//! returns the response with its [`CallDiagnostics`].

use crate::backend::{self, GenerateRequest, GenerateResponse};
use crate::diagnostics::CallDiagnostics;
use crate::error::Result;
use crate::events::{emit, Event};
use crate::exec_ctx::ExecCtx;
use crate::image::InlineImage;
use serde_json::Value;
use tracing::{debug, warn};

/// Output kinds the model may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    /// Wire name used in `responseModalities`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "TEXT",
            Modality::Image => "IMAGE",
        }
    }
}

/// Configuration for generation requests.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f64,

    /// Maximum tokens to generate.
    pub max_output_tokens: u32,

    /// Number of candidates requested. Only the first is ever read.
    pub candidate_count: u32,

    /// Requested output modalities.
    pub modalities: Vec<Modality>,

    /// Custom fields merged into the `generationConfig` object.
    pub options: Option<Value>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 2048,
            candidate_count: 1,
            modalities: vec![Modality::Text],
            options: None,
        }
    }
}

impl GenerationConfig {
    /// Compositing steps: low temperature, one candidate, text and image out.
    pub fn compositing() -> Self {
        Self {
            temperature: 0.2,
            max_output_tokens: 8192,
            candidate_count: 1,
            modalities: vec![Modality::Text, Modality::Image],
            options: None,
        }
    }

    /// Photoshoots: a fresh scene rather than an edit, so more latitude
    /// than compositing. Text and image out.
    pub fn photoshoot() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 8192,
            candidate_count: 1,
            modalities: vec![Modality::Text, Modality::Image],
            options: None,
        }
    }

    /// Category classification: deterministic, a few tokens of text.
    pub fn classification() -> Self {
        Self {
            temperature: 0.0,
            max_output_tokens: 16,
            candidate_count: 1,
            modalities: vec![Modality::Text],
            options: None,
        }
    }

    /// Photo analysis and scene extraction: near-deterministic text.
    pub fn analysis() -> Self {
        Self {
            temperature: 0.1,
            max_output_tokens: 1024,
            candidate_count: 1,
            modalities: vec![Modality::Text],
            options: None,
        }
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    pub fn with_modalities(mut self, modalities: Vec<Modality>) -> Self {
        self.modalities = modalities;
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }
}

/// A configured model call.
///
/// # Example
///
/// ```
/// use tryon_pipeline::client::{GenerationConfig, GenerativeClient};
///
/// let call = GenerativeClient::new("classify-0", "gemini-1.5-flash")
///     .with_config(GenerationConfig::classification());
/// assert_eq!(call.model, "gemini-1.5-flash");
/// ```
#[derive(Debug, Clone)]
pub struct GenerativeClient {
    /// Name used in retry events and log lines.
    pub name: String,
    /// Model identifier.
    pub model: String,
    /// Generation parameters.
    pub config: GenerationConfig,
    /// System instruction sent with every request.
    pub system: Option<String>,
}

/// A model response plus what it cost to obtain.
#[derive(Debug, Clone)]
pub struct CallOutput {
    pub response: GenerateResponse,
    pub diagnostics: CallDiagnostics,
}

impl GenerativeClient {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            config: GenerationConfig::default(),
            system: None,
        }
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Send `prompt` followed by `images` and wait for the reply.
    ///
    /// Rate limiting is retried per `ctx.backoff`; any other failure is
    /// returned as-is.
    pub async fn invoke(
        &self,
        ctx: &ExecCtx,
        prompt: &str,
        images: Vec<InlineImage>,
    ) -> Result<CallOutput> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            system: self.system.clone(),
            images,
            config: self.config.clone(),
        };

        debug!(
            call = %self.name,
            model = %self.model,
            images = request.images.len(),
            "sending generation request"
        );

        let mut transport_retries: u32 = 0;
        let mut backoff_total_ms: u64 = 0;
        let name = self.name.clone();
        let event_handler = ctx.event_handler.clone();

        let mut on_retry = |attempt: u32, delay: std::time::Duration, reason: &str| {
            transport_retries = attempt;
            backoff_total_ms += delay.as_millis() as u64;
            warn!(
                call = %name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "rate limited, retrying"
            );
            emit(
                &event_handler,
                Event::TransportRetry {
                    name: name.clone(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: reason.to_string(),
                },
            );
        };

        let response = backend::with_backoff(
            &ctx.backend,
            &ctx.client,
            &ctx.base_url,
            &request,
            &ctx.backoff,
            ctx.cancel_flag(),
            Some(&mut on_retry),
        )
        .await?;

        let diagnostics = CallDiagnostics {
            transport_retries,
            backoff_total_ms,
            finish_reason: response.finish_reason.clone(),
            block_reason: response.block_reason.clone(),
        };

        Ok(CallOutput {
            response,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackoffConfig, MockBackend, MockReply};
    use crate::events::FnEventHandler;
    use crate::PipelineError;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_generation_config_defaults() {
        let config = GenerationConfig::default();
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.candidate_count, 1);
        assert_eq!(config.modalities, vec![Modality::Text]);
        assert!(config.options.is_none());
    }

    #[test]
    fn test_presets() {
        let c = GenerationConfig::compositing();
        assert_eq!(c.modalities, vec![Modality::Text, Modality::Image]);
        assert!(c.temperature <= 0.3);

        let k = GenerationConfig::classification();
        assert_eq!(k.temperature, 0.0);
        assert_eq!(k.modalities, vec![Modality::Text]);

        let a = GenerationConfig::analysis().with_max_output_tokens(512);
        assert_eq!(a.max_output_tokens, 512);
        assert_eq!(a.temperature, 0.1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_counts_retries_and_emits_events() {
        let mock = Arc::new(MockBackend::new(vec![
            MockReply::RateLimited,
            MockReply::text("ok"),
        ]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ctx = ExecCtx::builder("http://unused")
            .backend(mock.clone())
            .event_handler(Arc::new(FnEventHandler(move |e: Event| {
                if let Event::TransportRetry { name, attempt, .. } = e {
                    sink.lock().unwrap().push((name, attempt));
                }
            })))
            .build()
            .unwrap();

        let out = GenerativeClient::new("classify-0", "m")
            .invoke(&ctx, "hello", vec![])
            .await
            .unwrap();

        assert_eq!(out.response.text(), "ok");
        assert_eq!(out.diagnostics.transport_retries, 1);
        assert_eq!(out.diagnostics.backoff_total_ms, 1000);
        assert_eq!(*seen.lock().unwrap(), vec![("classify-0".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_invoke_sends_prompt_then_images() {
        let mock = Arc::new(MockBackend::fixed(MockReply::text("fine")));
        let ctx = ExecCtx::builder("http://unused")
            .backend(mock.clone())
            .build()
            .unwrap();
        let img = InlineImage::new("image/png", vec![9u8, 9]);

        GenerativeClient::new("step-0", "img-model")
            .with_config(GenerationConfig::compositing())
            .invoke(&ctx, "compose", vec![img.clone()])
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "img-model");
        assert_eq!(requests[0].prompt, "compose");
        assert!(requests[0].images[0].is_same(&img));
        assert_eq!(requests[0].config, GenerationConfig::compositing());
    }

    #[tokio::test]
    async fn test_invoke_without_retry_budget_fails_on_first_429() {
        let mock = Arc::new(MockBackend::new(vec![MockReply::RateLimited]));
        let ctx = ExecCtx::builder("http://unused")
            .backend(mock.clone())
            .backoff(BackoffConfig::none())
            .build()
            .unwrap();

        let err = GenerativeClient::new("x", "m")
            .invoke(&ctx, "p", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RateLimited { attempts: 1, .. }));
        assert_eq!(mock.call_count(), 1);
    }
}
