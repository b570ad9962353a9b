//! Rate-limit retry with exponential backoff.
//!
//! [`BackoffConfig`] controls how 429 responses are retried with increasing
//! delays. The default matches what the try-on service has always done:
//! three attempts in total, waiting 1s then 2s, no jitter.

use std::time::Duration;

/// Configuration for rate-limit retry with exponential backoff.
///
/// # Example
///
/// ```
/// use tryon_pipeline::backend::BackoffConfig;
///
/// let none = BackoffConfig::none();
/// assert_eq!(none.max_retries, 0);
///
/// let standard = BackoffConfig::standard();
/// assert_eq!(standard.max_attempts(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Maximum number of retries after the first attempt. Default: 2.
    pub max_retries: u32,

    /// Delay before the first retry. Default: 1 second.
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each retry. Default: 2.0.
    pub multiplier: f64,

    /// Upper bound on any single delay, including `Retry-After` hints.
    /// Default: 30 seconds.
    pub max_delay: Duration,

    /// Jitter strategy. Default: None.
    pub jitter: JitterStrategy,

    /// Whether to honour `Retry-After` headers on 429 responses.
    /// Default: `true`.
    pub respect_retry_after: bool,
}

/// Jitter strategy for spreading retries from concurrent runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Delay is exactly the calculated value.
    None,

    /// Random value in `[0, calculated_delay]`.
    Full,

    /// `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// No retry. The first 429 is final.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::standard()
        }
    }

    /// Three attempts, 1s initial delay doubling each time, no jitter.
    pub fn standard() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: JitterStrategy::None,
            respect_retry_after: true,
        }
    }

    /// Many concurrent runs sharing one quota: more attempts, equal jitter.
    pub fn shared_quota() -> Self {
        Self {
            max_retries: 4,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::Equal,
            respect_retry_after: true,
        }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Calculate the delay for retry N (0-indexed).
    ///
    /// The base delay is `initial_delay * multiplier^attempt`, capped at
    /// `max_delay`. Jitter is then applied according to the configured strategy.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::from_secs_f64(jittered)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::standard()
    }
}
