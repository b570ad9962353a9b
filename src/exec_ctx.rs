//! Execution context shared across pipeline runs.
//!
//! [`ExecCtx`] carries the HTTP client, generative backend, endpoint, model
//! identifiers, backoff policy, cancellation handle, and optional event
//! handler. It is constructed once and shared by every run; it holds no
//! per-run state, so concurrent runs need no locking.

use crate::backend::{Backend, BackoffConfig, GeminiBackend};
use crate::config::{ServiceConfig, DEFAULT_ENDPOINT, DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
use crate::error::Result;
use crate::events::EventHandler;
use crate::PipelineError;
use reqwest::Client;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

/// Shared execution context for pipeline runs.
///
/// # Example
///
/// ```
/// use tryon_pipeline::{ExecCtx, MockBackend, MockReply};
/// use std::sync::Arc;
///
/// let ctx = ExecCtx::builder("http://unused")
///     .backend(Arc::new(MockBackend::fixed(MockReply::text("dress"))))
///     .build()
///     .unwrap();
/// assert_eq!(ctx.backend.name(), "mock");
/// ```
pub struct ExecCtx {
    /// HTTP client (cheap to clone -- uses `Arc` internally).
    pub client: Client,
    /// Base URL for the service (e.g. `https://generativelanguage.googleapis.com`).
    pub base_url: String,
    /// Generative backend.
    pub backend: Arc<dyn Backend>,
    /// Rate-limit retry configuration. Default: [`BackoffConfig::standard()`].
    pub backoff: BackoffConfig,
    /// Model used for compositing steps.
    pub image_model: String,
    /// Model used for classification and text analysis.
    pub text_model: String,
    /// Optional cancellation flag; checked before every call and after every backoff sleep.
    pub cancellation: Option<Arc<AtomicBool>>,
    /// Optional event handler for lifecycle events.
    pub event_handler: Option<Arc<dyn EventHandler>>,
}

impl ExecCtx {
    /// Create a new builder.
    pub fn builder(base_url: impl Into<String>) -> ExecCtxBuilder {
        ExecCtxBuilder {
            client: None,
            base_url: base_url.into(),
            backend: None,
            api_key: None,
            backoff: None,
            image_model: None,
            text_model: None,
            cancellation: None,
            event_handler: None,
            timeout: None,
        }
    }

    /// Build a Gemini-backed context from a [`ServiceConfig`].
    pub fn from_config(config: &ServiceConfig) -> Result<ExecCtx> {
        ExecCtx::builder(&config.endpoint)
            .api_key(&config.api_key)
            .image_model(&config.image_model)
            .text_model(&config.text_model)
            .timeout(config.timeout)
            .build()
    }

    /// Build a Gemini-backed context from environment variables.
    ///
    /// Fails with [`PipelineError::Config`] when `GEMINI_API_KEY` is missing.
    pub fn from_env() -> Result<ExecCtx> {
        Self::from_config(&ServiceConfig::from_env()?)
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    /// Return an error if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// Get a reference to the cancellation AtomicBool, if set.
    pub fn cancel_flag(&self) -> Option<&AtomicBool> {
        self.cancellation.as_deref()
    }
}

impl std::fmt::Debug for ExecCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecCtx")
            .field("base_url", &self.base_url)
            .field("backend", &self.backend.name())
            .field("backoff", &self.backoff)
            .field("image_model", &self.image_model)
            .field("text_model", &self.text_model)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

/// Builder for [`ExecCtx`].
pub struct ExecCtxBuilder {
    client: Option<Client>,
    base_url: String,
    backend: Option<Arc<dyn Backend>>,
    api_key: Option<String>,
    backoff: Option<BackoffConfig>,
    image_model: Option<String>,
    text_model: Option<String>,
    cancellation: Option<Arc<AtomicBool>>,
    event_handler: Option<Arc<dyn EventHandler>>,
    timeout: Option<Duration>,
}

impl ExecCtxBuilder {
    /// Set the HTTP client. If not set, a default client is created.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the backend explicitly. Takes precedence over [`api_key`](Self::api_key).
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use the Gemini backend with this API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the rate-limit retry configuration. Default: [`BackoffConfig::standard()`].
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = Some(config);
        self
    }

    /// Set the compositing model.
    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = Some(model.into());
        self
    }

    /// Set the classification / analysis model.
    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.text_model = Some(model.into());
        self
    }

    /// Set the cancellation flag.
    pub fn cancellation(mut self, cancel: Option<Arc<AtomicBool>>) -> Self {
        self.cancellation = cancel;
        self
    }

    /// Set the event handler.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Set the request timeout. Default: 120 seconds.
    ///
    /// Ignored when a custom `Client` is provided via `.client()`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the execution context.
    ///
    /// Fails with [`PipelineError::Config`] when neither a backend nor an
    /// API key was supplied, when the key is blank, or when the HTTP client
    /// cannot be constructed.
    pub fn build(self) -> Result<ExecCtx> {
        let backend: Arc<dyn Backend> = match (self.backend, self.api_key) {
            (Some(backend), _) => backend,
            (None, Some(key)) => Arc::new(GeminiBackend::new(key)?),
            (None, None) => {
                return Err(PipelineError::Config(
                    "no backend configured: provide an API key or a backend".to_string(),
                ))
            }
        };

        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout.unwrap_or(crate::config::DEFAULT_TIMEOUT))
                .build()
                .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {}", e)))?,
        };

        let base_url = if self.base_url.trim().is_empty() {
            DEFAULT_ENDPOINT.to_string()
        } else {
            normalize_base_url(&self.base_url)
        };

        Ok(ExecCtx {
            client,
            base_url,
            backend,
            backoff: self.backoff.unwrap_or_default(),
            image_model: self
                .image_model
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            text_model: self
                .text_model
                .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            cancellation: self.cancellation,
            event_handler: self.event_handler,
        })
    }
}

/// Strip API path suffixes from a base URL.
/// This prevents double-pathing when the backend appends its own path.
/// e.g., "https://generativelanguage.googleapis.com/v1beta" -> "https://generativelanguage.googleapis.com"
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    // longest first
    for suffix in &["/v1beta/models", "/v1beta", "/v1"] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}
