use crate::step::StepFailure;
use crate::types::PartialRun;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the try-on pipeline and its components.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Missing credential or an unusable client configuration.
    ///
    /// Always raised before any external call is attempted.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required request field is missing or empty.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The service kept answering 429 until the retry budget ran out.
    #[error("Rate limited after {attempts} attempt(s): {body}")]
    RateLimited {
        /// Total attempts made, including the first.
        attempts: u32,
        /// Body of the last 429 response.
        body: String,
        /// Parsed `Retry-After` header value from the last response, if present.
        retry_after: Option<Duration>,
    },

    /// Non-success status other than 429. Never retried.
    #[error("Service returned HTTP {status}: {body}")]
    Service {
        /// HTTP status code (e.g. 400, 403, 500).
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The service answered 2xx but the body could not be understood.
    #[error("Malformed service response ({reason}): {raw}")]
    MalformedResponse {
        /// What went wrong while decoding.
        reason: String,
        /// The raw, unparsed body.
        raw: String,
    },

    /// A compositing step failed and the run was aborted.
    ///
    /// `partial` holds every step result and iteration recorded up to and
    /// including the failing step. It never contains a final image.
    #[error("Step {index} failed: {reason}")]
    StepFailed {
        /// 0-based index of the failing product.
        index: usize,
        /// Typed cause of the failure.
        reason: StepFailure,
        /// Provenance accumulated before the abort.
        partial: Box<PartialRun>,
    },

    /// The run was cancelled via the cancellation flag.
    #[error("Pipeline was cancelled")]
    Cancelled,

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Whether this error is a local rejection that happened before any
    /// external call (configuration or input).
    pub fn is_pre_flight(&self) -> bool {
        matches!(self, PipelineError::Config(_) | PipelineError::InvalidInput(_))
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_flight_classification() {
        assert!(PipelineError::Config("no key".into()).is_pre_flight());
        assert!(PipelineError::InvalidInput("no products".into()).is_pre_flight());
        assert!(!PipelineError::Cancelled.is_pre_flight());
        assert!(!PipelineError::Service {
            status: 500,
            body: String::new()
        }
        .is_pre_flight());
    }

    #[test]
    fn test_rate_limited_display() {
        let err = PipelineError::RateLimited {
            attempts: 3,
            body: "quota".into(),
            retry_after: None,
        };
        assert_eq!(err.to_string(), "Rate limited after 3 attempt(s): quota");
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: PipelineError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, PipelineError::Other(ref m) if m == "boom"));
    }
}
