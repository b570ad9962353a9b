//! Service configuration.
//!
//! [`ServiceConfig`] holds the recognised options for reaching the
//! generative service: endpoint, model identifiers, credential and transport
//! timeout. It is loaded from the environment once and handed to
//! [`ExecCtx::from_config`](crate::ExecCtx::from_config).

use crate::error::Result;
use crate::PipelineError;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Required: the service credential.
pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_ENDPOINT: &str = "GEMINI_ENDPOINT";
pub const ENV_IMAGE_MODEL: &str = "GEMINI_IMAGE_MODEL";
pub const ENV_TEXT_MODEL: &str = "GEMINI_TEXT_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "GEMINI_TIMEOUT_SECS";

/// Connection settings for the generative service.
#[derive(Clone)]
pub struct ServiceConfig {
    /// Base URL, without the `/v1beta/...` path.
    pub endpoint: String,
    /// Credential sent with every call. Never logged.
    pub api_key: String,
    /// Model used for compositing steps (must support image output).
    pub image_model: String,
    /// Model used for classification and text-only analysis.
    pub text_model: String,
    /// Per-request transport timeout.
    pub timeout: Duration,
}

impl ServiceConfig {
    /// Defaults for everything except the credential.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Load from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    ///
    /// A missing or blank `GEMINI_API_KEY` is a [`PipelineError::Config`].
    /// Blank optional variables fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get(ENV_API_KEY).ok_or_else(|| {
            PipelineError::Config(format!("{} is not set", ENV_API_KEY))
        })?;

        let mut config = Self::new(api_key.trim());
        if let Some(endpoint) = get(ENV_ENDPOINT) {
            config.endpoint = endpoint;
        }
        if let Some(model) = get(ENV_IMAGE_MODEL) {
            config.image_model = model;
        }
        if let Some(model) = get(ENV_TEXT_MODEL) {
            config.text_model = model;
        }
        if let Some(raw) = get(ENV_TIMEOUT_SECS) {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                PipelineError::Config(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    ENV_TIMEOUT_SECS, raw
                ))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[redacted]")
            .field("image_model", &self.image_model)
            .field("text_model", &self.text_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let err = ServiceConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref m) if m.contains(ENV_API_KEY)));
    }

    #[test]
    fn test_blank_key_is_config_error() {
        let err = ServiceConfig::from_lookup(lookup(&[(ENV_API_KEY, "   ")])).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_defaults_applied() {
        let config = ServiceConfig::from_lookup(lookup(&[(ENV_API_KEY, "k")])).unwrap();
        assert_eq!(config.api_key, "k");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.image_model, DEFAULT_IMAGE_MODEL);
        assert_eq!(config.text_model, DEFAULT_TEXT_MODEL);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_overrides_applied() {
        let config = ServiceConfig::from_lookup(lookup(&[
            (ENV_API_KEY, "k"),
            (ENV_ENDPOINT, "http://localhost:8080"),
            (ENV_IMAGE_MODEL, "img-model"),
            (ENV_TEXT_MODEL, ""),
            (ENV_TIMEOUT_SECS, "45"),
        ]))
        .unwrap();
        assert_eq!(config.endpoint, "http://localhost:8080");
        assert_eq!(config.image_model, "img-model");
        assert_eq!(config.text_model, DEFAULT_TEXT_MODEL);
        assert_eq!(config.timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_bad_timeout_rejected() {
        let err = ServiceConfig::from_lookup(lookup(&[
            (ENV_API_KEY, "k"),
            (ENV_TIMEOUT_SECS, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ServiceConfig::new("super-secret");
        assert!(!format!("{:?}", config).contains("super-secret"));
    }
}
