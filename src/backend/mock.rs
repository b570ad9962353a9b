//! Mock backend for testing without a live service.
//!
//! [`MockBackend`] plays back scripted [`MockReply`]s in order and records
//! every request it receives, so tests can assert on prompts and on which
//! images were threaded into each call.
//!
//! # Example
//!
//! ```
//! use tryon_pipeline::backend::{MockBackend, MockReply};
//!
//! let mock = MockBackend::new(vec![
//!     MockReply::text("dress"),
//!     MockReply::image("image/png", vec![1, 2, 3], "Added the dress."),
//! ]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{Backend, GenerateRequest, GenerateResponse, Part};
use crate::error::Result;
use crate::image::InlineImage;
use crate::PipelineError;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A 200 response with these parts.
    Parts(Vec<Part>),
    /// A 200 response with no parts and the given block reason.
    Blocked(String),
    /// HTTP 429 without a `Retry-After` hint.
    RateLimited,
    /// HTTP 429 with a `Retry-After` hint.
    RateLimitedFor(Duration),
    /// Any other non-success status with a body.
    Status(u16, String),
    /// A 200 response whose body is not the expected JSON.
    Malformed(String),
}

impl MockReply {
    /// A text-only reply.
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Parts(vec![Part::Text(text.into())])
    }

    /// A reply with an explanatory text part followed by an image part.
    pub fn image(mime_type: &str, bytes: Vec<u8>, text: impl Into<String>) -> Self {
        MockReply::Parts(vec![
            Part::Text(text.into()),
            Part::Image(InlineImage::new(mime_type, bytes)),
        ])
    }
}

/// A test backend that returns scripted replies in order.
///
/// Cycles back to the beginning when all replies have been consumed.
#[derive(Debug)]
pub struct MockBackend {
    replies: Vec<MockReply>,
    index: AtomicUsize,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl MockBackend {
    /// Create a mock backend with the given scripted replies.
    pub fn new(replies: Vec<MockReply>) -> Self {
        assert!(!replies.is_empty(), "MockBackend requires at least one reply");
        Self {
            replies,
            index: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always gives the same reply.
    pub fn fixed(reply: MockReply) -> Self {
        Self::new(vec![reply])
    }

    /// Number of `generate` calls received so far.
    pub fn call_count(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    /// Snapshot of every request received, in order.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self) -> MockReply {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        self.replies[idx].clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn generate(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }

        match self.next_reply() {
            MockReply::Parts(parts) => Ok(GenerateResponse::from_parts(parts)),
            MockReply::Blocked(reason) => Ok(GenerateResponse {
                block_reason: Some(reason),
                ..GenerateResponse::from_parts(Vec::new())
            }),
            MockReply::RateLimited => Err(PipelineError::RateLimited {
                attempts: 1,
                body: "Resource has been exhausted".to_string(),
                retry_after: None,
            }),
            MockReply::RateLimitedFor(delay) => Err(PipelineError::RateLimited {
                attempts: 1,
                body: "Resource has been exhausted".to_string(),
                retry_after: Some(delay),
            }),
            MockReply::Status(status, body) => Err(PipelineError::Service { status, body }),
            MockReply::Malformed(raw) => Err(PipelineError::MalformedResponse {
                reason: "expected JSON document".to_string(),
                raw,
            }),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GenerationConfig;

    fn test_request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: "test".to_string(),
            prompt: prompt.to_string(),
            system: None,
            images: vec![],
            config: GenerationConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_mock_fixed_reply() {
        let mock = MockBackend::fixed(MockReply::text("Hello!"));
        let client = Client::new();
        let resp = mock
            .generate(&client, "http://unused", &test_request("hi"))
            .await
            .unwrap();
        assert_eq!(resp.text(), "Hello!");
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn test_mock_cycles_and_records() {
        let mock = MockBackend::new(vec![MockReply::text("first"), MockReply::RateLimited]);
        let client = Client::new();

        let r1 = mock.generate(&client, "http://unused", &test_request("a")).await;
        let r2 = mock.generate(&client, "http://unused", &test_request("b")).await;
        let r3 = mock.generate(&client, "http://unused", &test_request("c")).await;

        assert_eq!(r1.unwrap().text(), "first");
        assert!(matches!(r2, Err(PipelineError::RateLimited { .. })));
        assert_eq!(r3.unwrap().text(), "first"); // cycles

        assert_eq!(mock.call_count(), 3);
        let prompts: Vec<String> = mock.requests().into_iter().map(|r| r.prompt).collect();
        assert_eq!(prompts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_mock_blocked_reply() {
        let mock = MockBackend::fixed(MockReply::Blocked("SAFETY".into()));
        let resp = mock
            .generate(&Client::new(), "http://unused", &test_request("x"))
            .await
            .unwrap();
        assert!(resp.parts.is_empty());
        assert_eq!(resp.block_reason.as_deref(), Some("SAFETY"));
    }
}
