//! Per-call transport diagnostics.
//!
//! [`CallDiagnostics`] records what happened on the wire for one generative
//! call: how many rate-limit retries were needed, how long was spent
//! waiting, and why the service stopped generating.

use serde::{Deserialize, Serialize};

/// Records what happened while making one generative call.
///
/// Attached to every [`CallOutput`](crate::client::CallOutput) and copied
/// into each [`StepResult`](crate::types::StepResult).
///
/// # Example
///
/// ```
/// use tryon_pipeline::diagnostics::CallDiagnostics;
///
/// let diag = CallDiagnostics::default();
/// assert!(!diag.was_retried());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDiagnostics {
    /// Number of rate-limit retries before the request succeeded.
    /// 0 = first attempt succeeded.
    pub transport_retries: u32,

    /// Total time spent in backoff delays (milliseconds).
    pub backoff_total_ms: u64,

    /// Candidate finish reason reported by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    /// Prompt block reason reported by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

impl CallDiagnostics {
    /// Whether at least one retry was needed.
    pub fn was_retried(&self) -> bool {
        self.transport_retries > 0
    }
}
