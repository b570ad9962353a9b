//! Backend trait and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over the generative service, translating
//! between normalized [`GenerateRequest`]/[`GenerateResponse`] types and the
//! provider's HTTP API. Built-in implementations: [`GeminiBackend`] and the
//! scripted [`MockBackend`].
//!
//! ## Architecture
//!
//! ```text
//! GenerativeClient ──► GenerateRequest ──► with_backoff() ──► Backend::generate() ──► GenerateResponse
//!                                              │                     │
//!                                      retries 429 only     ┌────────┴────────┐
//!                                                      GeminiBackend     MockBackend
//!                                                 :generateContent      scripted replies
//! ```

pub mod backoff;
pub mod gemini;
pub mod mock;

pub use backoff::BackoffConfig;
pub use gemini::GeminiBackend;
pub use mock::{MockBackend, MockReply};

use crate::client::GenerationConfig;
use crate::error::Result;
use crate::image::InlineImage;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Type alias for the callback invoked before each transport retry.
///
/// Arguments: `(attempt_number, delay_before_retry, reason_for_retry)`.
pub type RetryCallback<'a> = Option<&'a mut (dyn FnMut(u32, std::time::Duration, &str) + Send)>;

/// A normalized, provider-agnostic generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Model identifier (e.g. `"gemini-2.5-flash-image-preview"`).
    pub model: String,

    /// The instruction text. Always sent as the first part.
    pub prompt: String,

    /// Optional system instruction, sent apart from the user content.
    pub system: Option<String>,

    /// Images sent after the prompt, in order.
    pub images: Vec<InlineImage>,

    /// Generation parameters (temperature, output size, modalities).
    pub config: GenerationConfig,
}

/// One part of a model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// A text fragment.
    Text(String),
    /// An inline image.
    Image(InlineImage),
}

/// A normalized generation response.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// Parts of the first candidate, in the order the service returned them.
    pub parts: Vec<Part>,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Why the candidate stopped (e.g. `"STOP"`, `"SAFETY"`, `"IMAGE_SAFETY"`).
    pub finish_reason: Option<String>,

    /// Why the prompt was blocked before any candidate was produced.
    pub block_reason: Option<String>,

    /// Provider-specific metadata (token counts, model version).
    pub metadata: Option<serde_json::Value>,
}

impl GenerateResponse {
    /// A 200 response made of the given parts.
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self {
            parts,
            status: 200,
            finish_reason: None,
            block_reason: None,
            metadata: None,
        }
    }

    /// All text fragments joined in order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// The first image part, if any.
    pub fn first_image(&self) -> Option<&InlineImage> {
        self.parts.iter().find_map(|p| match p {
            Part::Image(img) => Some(img),
            Part::Text(_) => None,
        })
    }
}

/// Abstraction over generative providers.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute one generation call. No retry happens here.
    ///
    /// Implementations map HTTP 429 to [`PipelineError::RateLimited`] with
    /// `attempts: 1`, any other non-success status to
    /// [`PipelineError::Service`], and an undecodable body to
    /// [`PipelineError::MalformedResponse`].
    async fn generate(
        &self,
        client: &Client,
        base_url: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Only rate limiting is retried. Every other failure surfaces immediately.
pub fn is_retryable(error: &PipelineError) -> bool {
    matches!(error, PipelineError::RateLimited { .. })
}

fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

/// Execute a backend call with bounded retry on rate limiting.
///
/// Makes at most `config.max_retries + 1` attempts. When the budget runs
/// out on a 429, the returned [`PipelineError::RateLimited`] carries the
/// total number of attempts made.
///
/// # Arguments
///
/// * `backend`: The generative backend to call
/// * `client`: HTTP client for making requests
/// * `base_url`: Base URL for the API
/// * `request`: The normalized request
/// * `config`: Backoff configuration
/// * `cancel`: Optional cancellation flag
/// * `on_retry`: Optional callback invoked before each retry with (attempt, delay, reason)
pub async fn with_backoff(
    backend: &Arc<dyn Backend>,
    client: &Client,
    base_url: &str,
    request: &GenerateRequest,
    config: &BackoffConfig,
    cancel: Option<&AtomicBool>,
    mut on_retry: RetryCallback<'_>,
) -> Result<GenerateResponse> {
    let mut last_error: Option<PipelineError> = None;

    for attempt in 0..=config.max_retries {
        if is_cancelled(cancel) {
            return Err(PipelineError::Cancelled);
        }

        if attempt > 0 {
            let delay = match &last_error {
                Some(PipelineError::RateLimited {
                    retry_after: Some(ra),
                    ..
                }) if config.respect_retry_after => (*ra).min(config.max_delay),
                _ => config.delay_for_attempt(attempt - 1),
            };

            let reason = last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();

            if let Some(ref mut cb) = on_retry {
                cb(attempt, delay, &reason);
            }

            tokio::time::sleep(delay).await;

            if is_cancelled(cancel) {
                return Err(PipelineError::Cancelled);
            }
        }

        match backend.generate(client, base_url, request).await {
            Ok(response) => return Ok(response),
            Err(e) if is_retryable(&e) => {
                if attempt < config.max_retries {
                    last_error = Some(e);
                    continue;
                }
                return Err(match e {
                    PipelineError::RateLimited {
                        body, retry_after, ..
                    } => PipelineError::RateLimited {
                        attempts: attempt + 1,
                        body,
                        retry_after,
                    },
                    other => other,
                });
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or(PipelineError::Other(
        "backoff loop exited unexpectedly".into(),
    )))
}
