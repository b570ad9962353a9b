//! Inline image payloads.
//!
//! [`InlineImage`] is the unit passed between the client application, the
//! pipeline and the generative service. The bytes live behind an `Arc`, so
//! handing the same image to an iteration, a step request and a result never
//! copies pixel data, and identity can be checked with [`InlineImage::is_same`].
//!
//! On the wire an image is a data URL (`data:image/png;base64,...`). Bare
//! base64 is also accepted and assumed to be JPEG.

use crate::error::Result;
use crate::PipelineError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// MIME type assumed when the caller sends bare base64.
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// A binary image with its MIME type.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InlineImage {
    mime_type: String,
    data: Arc<[u8]>,
}

impl InlineImage {
    /// Wrap raw bytes.
    pub fn new(mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: Arc::from(data.into()),
        }
    }

    /// Decode a base64 payload.
    pub fn from_base64(mime_type: impl Into<String>, encoded: &str) -> Result<Self> {
        let bytes = BASE64.decode(encoded.trim().as_bytes()).map_err(|e| {
            PipelineError::InvalidInput(format!("image payload is not valid base64: {}", e))
        })?;
        Ok(Self::new(mime_type, bytes))
    }

    /// Parse a `data:<mime>;base64,<payload>` URL, or bare base64.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let trimmed = url.trim();
        let Some(rest) = trimmed.strip_prefix("data:") else {
            return Self::from_base64(DEFAULT_MIME_TYPE, trimmed);
        };

        let (header, payload) = rest.split_once(',').ok_or_else(|| {
            PipelineError::InvalidInput("data URL has no ',' separator".to_string())
        })?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| PipelineError::InvalidInput("data URL is not base64".to_string()))?;
        let mime = if mime.is_empty() { DEFAULT_MIME_TYPE } else { mime };

        Self::from_base64(mime, payload)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Base64 of the payload (no data-URL header).
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    /// Whether both values share the same underlying buffer.
    ///
    /// Stronger than `==`: true only when no copy was made along the way.
    pub fn is_same(&self, other: &InlineImage) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for InlineImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl TryFrom<String> for InlineImage {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_data_url(&value)
    }
}

impl From<InlineImage> for String {
    fn from(image: InlineImage) -> Self {
        image.to_data_url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_url() {
        let img = InlineImage::from_data_url("data:image/png;base64,AAEC").unwrap();
        assert_eq!(img.mime_type(), "image/png");
        assert_eq!(img.bytes(), &[0u8, 1, 2]);
    }

    #[test]
    fn test_bare_base64_defaults_to_jpeg() {
        let img = InlineImage::from_data_url("AAEC").unwrap();
        assert_eq!(img.mime_type(), DEFAULT_MIME_TYPE);
        assert_eq!(img.len(), 3);
    }

    #[test]
    fn test_invalid_base64_is_input_error() {
        let err = InlineImage::from_data_url("data:image/png;base64,@@@").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn test_non_base64_data_url_rejected() {
        let err = InlineImage::from_data_url("data:text/plain,hello").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn test_data_url_formatting() {
        let img = InlineImage::new("image/png", vec![0u8, 1, 2]);
        assert_eq!(img.to_data_url(), "data:image/png;base64,AAEC");
    }

    #[test]
    fn test_clone_shares_buffer() {
        let img = InlineImage::new("image/png", vec![9u8; 16]);
        let copy = img.clone();
        assert!(img.is_same(&copy));

        let rebuilt = InlineImage::new("image/png", vec![9u8; 16]);
        assert_eq!(img, rebuilt);
        assert!(!img.is_same(&rebuilt));
    }

    #[test]
    fn test_serde_as_data_url() {
        let img = InlineImage::new("image/jpeg", vec![1u8, 2, 3]);
        let json = serde_json::to_value(&img).unwrap();
        assert_eq!(json, serde_json::json!("data:image/jpeg;base64,AQID"));

        let back: InlineImage = serde_json::from_value(json).unwrap();
        assert_eq!(back, img);
    }
}
