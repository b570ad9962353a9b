//! Backend for the Gemini `generateContent` API.
//!
//! [`GeminiBackend`] translates normalized [`GenerateRequest`]s into
//! `POST {base}/v1beta/models/{model}:generateContent` calls and decodes the
//! first candidate's parts back into [`Part`]s.

use super::{Backend, GenerateRequest, GenerateResponse, Part};
use crate::error::Result;
use crate::image::{InlineImage, DEFAULT_MIME_TYPE};
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;

/// Header carrying the API key. Keeps the key out of URLs and logs.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Backend for Google's Gemini API.
///
/// Holds the credential; everything else (base URL, model, generation
/// parameters) arrives per request.
#[derive(Clone)]
pub struct GeminiBackend {
    api_key: String,
}

impl GeminiBackend {
    /// Create a backend with the given API key.
    ///
    /// An empty or whitespace-only key is a configuration error.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(PipelineError::Config("Gemini API key is empty".to_string()));
        }
        Ok(Self { api_key })
    }

    fn endpoint(base_url: &str, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            model
        )
    }

    /// Build the `generationConfig` object from the request config.
    fn build_generation_config(request: &GenerateRequest) -> Value {
        let config = &request.config;
        let modalities: Vec<&str> = config.modalities.iter().map(|m| m.as_str()).collect();
        let mut gen = json!({
            "temperature": config.temperature,
            "maxOutputTokens": config.max_output_tokens,
            "candidateCount": config.candidate_count,
            "responseModalities": modalities,
        });
        if let Some(ref custom) = config.options {
            if let (Some(base), Some(extra)) = (gen.as_object_mut(), custom.as_object()) {
                for (k, v) in extra {
                    base.insert(k.clone(), v.clone());
                }
            }
        }
        gen
    }

    /// Build the JSON body: prompt first, then images in order. A system
    /// instruction, when present, goes in `systemInstruction`.
    fn build_body(request: &GenerateRequest) -> Value {
        let mut parts = Vec::with_capacity(request.images.len() + 1);
        parts.push(json!({ "text": request.prompt }));
        for image in &request.images {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.mime_type(),
                    "data": image.to_base64(),
                }
            }));
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": Self::build_generation_config(request),
        });
        if let Some(ref system) = request.system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }

    /// Parse a Retry-After header value as seconds.
    fn parse_retry_after(value: &str) -> Option<std::time::Duration> {
        value
            .trim()
            .parse::<u64>()
            .ok()
            .map(std::time::Duration::from_secs)
    }

    /// Decode a 2xx body into a [`GenerateResponse`].
    ///
    /// Only the first candidate is read. A body that is not the expected
    /// JSON document, or inline data that is not base64, is a
    /// [`PipelineError::MalformedResponse`] carrying the raw body.
    fn parse_response(status: u16, raw: &str) -> Result<GenerateResponse> {
        let wire: WireResponse =
            serde_json::from_str(raw).map_err(|e| PipelineError::MalformedResponse {
                reason: e.to_string(),
                raw: raw.to_string(),
            })?;

        let candidate = wire.candidates.into_iter().next();
        let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());
        let wire_parts = candidate
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default();

        let mut parts = Vec::with_capacity(wire_parts.len());
        for part in wire_parts {
            if let Some(text) = part.text {
                parts.push(Part::Text(text));
            }
            if let Some(inline) = part.inline_data {
                let Some(data) = inline.data.filter(|d| !d.is_empty()) else {
                    continue;
                };
                let mime = inline.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE);
                let image = InlineImage::from_base64(mime, &data).map_err(|e| {
                    PipelineError::MalformedResponse {
                        reason: format!("inline image: {}", e),
                        raw: raw.to_string(),
                    }
                })?;
                parts.push(Part::Image(image));
            }
        }

        Ok(GenerateResponse {
            parts,
            status,
            finish_reason,
            block_reason: wire.prompt_feedback.and_then(|f| f.block_reason),
            metadata: wire.usage_metadata,
        })
    }
}

impl fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("api_key", &"[redacted]")
            .finish()
    }
}

/// Body of an error response, or a marker saying why it could not be read.
fn error_body<E: fmt::Display>(read: std::result::Result<String, E>) -> String {
    read.unwrap_or_else(|e| format!("<unreadable body: {}>", e))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    prompt_feedback: Option<WirePromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, alias = "inline_data")]
    inline_data: Option<WireInlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInlineData {
    #[serde(default, alias = "mime_type")]
    mime_type: Option<String>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[async_trait]
impl Backend for GeminiBackend {
    async fn generate(
        &self,
        client: &Client,
        base_url: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse> {
        let url = Self::endpoint(base_url, &request.model);
        let body = Self::build_body(request);

        let resp = client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();

        if status == 429 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(Self::parse_retry_after);
            let text = error_body(resp.text().await);
            return Err(PipelineError::RateLimited {
                attempts: 1,
                body: text,
                retry_after,
            });
        }

        if !resp.status().is_success() {
            let text = error_body(resp.text().await);
            return Err(PipelineError::Service { status, body: text });
        }

        let raw = resp.text().await?;
        Self::parse_response(status, &raw)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{GenerationConfig, Modality};

    fn test_request() -> GenerateRequest {
        GenerateRequest {
            model: "gemini-2.5-flash-image-preview".into(),
            prompt: "Dress the person.".into(),
            system: None,
            images: vec![
                InlineImage::new("image/jpeg", vec![0u8, 1, 2]),
                InlineImage::new("image/png", vec![3u8, 4, 5]),
            ],
            config: GenerationConfig::compositing(),
        }
    }

    #[test]
    fn test_empty_key_is_config_error() {
        assert!(matches!(
            GeminiBackend::new("  "),
            Err(PipelineError::Config(_))
        ));
        assert!(GeminiBackend::new("abc").is_ok());
    }

    #[test]
    fn test_debug_redacts_key() {
        let backend = GeminiBackend::new("secret-key").unwrap();
        let shown = format!("{:?}", backend);
        assert!(!shown.contains("secret-key"));
    }

    #[test]
    fn test_endpoint_format() {
        assert_eq!(
            GeminiBackend::endpoint("https://generativelanguage.googleapis.com/", "gemini-1.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn test_body_prompt_then_images() {
        let body = GeminiBackend::build_body(&test_request());
        let parts = body["contents"][0]["parts"].as_array().expect("parts");

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["text"], "Dress the person.");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[1]["inlineData"]["data"], "AAEC");
        assert_eq!(parts[2]["inlineData"]["mimeType"], "image/png");
        assert_eq!(body["contents"][0]["role"], "user");
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_body_system_instruction() {
        let mut request = test_request();
        request.system = Some("You are a creative director.".into());

        let body = GeminiBackend::build_body(&request);
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are a creative director."
        );
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Dress the person.");
    }

    #[test]
    fn test_error_body_reports_read_failure() {
        assert_eq!(error_body::<String>(Ok("quota exceeded".into())), "quota exceeded");
        assert_eq!(
            error_body(Err("connection reset by peer")),
            "<unreadable body: connection reset by peer>"
        );
    }

    #[test]
    fn test_body_generation_config() {
        let body = GeminiBackend::build_body(&test_request());
        let gen = &body["generationConfig"];

        assert_eq!(gen["candidateCount"], 1);
        assert_eq!(gen["responseModalities"], json!(["TEXT", "IMAGE"]));
        assert!(gen["temperature"].as_f64().unwrap() <= 0.3);
    }

    #[test]
    fn test_body_custom_options_merged() {
        let mut request = test_request();
        request.config = GenerationConfig::default()
            .with_modalities(vec![Modality::Text])
            .with_options(json!({"topP": 0.8, "topK": 40}));

        let body = GeminiBackend::build_body(&request);
        assert_eq!(body["generationConfig"]["topP"], 0.8);
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["responseModalities"], json!(["TEXT"]));
    }

    #[test]
    fn test_parse_text_and_image_parts() {
        let raw = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Added the dress."},
                    {"inlineData": {"mimeType": "image/png", "data": "AAEC"}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"totalTokenCount": 1290}
        }"#;

        let response = GeminiBackend::parse_response(200, raw).unwrap();
        assert_eq!(response.parts.len(), 2);
        assert_eq!(response.text(), "Added the dress.");
        let image = response.first_image().unwrap();
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.bytes(), &[0u8, 1, 2]);
        assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(response.metadata.unwrap()["totalTokenCount"], 1290);
    }

    #[test]
    fn test_parse_snake_case_inline_data() {
        let raw = r#"{"candidates": [{"content": {"parts": [
            {"inline_data": {"mime_type": "image/webp", "data": "AQID"}}
        ]}}]}"#;

        let response = GeminiBackend::parse_response(200, raw).unwrap();
        assert_eq!(response.first_image().unwrap().mime_type(), "image/webp");
    }

    #[test]
    fn test_parse_missing_mime_defaults_to_jpeg() {
        let raw = r#"{"candidates": [{"content": {"parts": [
            {"inlineData": {"data": "AQID"}}
        ]}}]}"#;

        let response = GeminiBackend::parse_response(200, raw).unwrap();
        assert_eq!(response.first_image().unwrap().mime_type(), "image/jpeg");
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let raw = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;

        let response = GeminiBackend::parse_response(200, raw).unwrap();
        assert!(response.parts.is_empty());
        assert_eq!(response.block_reason.as_deref(), Some("SAFETY"));
    }

    #[test]
    fn test_parse_malformed_keeps_raw_body() {
        let raw = "<html>Bad Gateway</html>";
        match GeminiBackend::parse_response(200, raw).unwrap_err() {
            PipelineError::MalformedResponse { raw: kept, .. } => assert_eq!(kept, raw),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_bad_inline_base64_is_malformed() {
        let raw = r#"{"candidates": [{"content": {"parts": [
            {"inlineData": {"mimeType": "image/png", "data": "@@@"}}
        ]}}]}"#;

        assert!(matches!(
            GeminiBackend::parse_response(200, raw),
            Err(PipelineError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(
            GeminiBackend::parse_retry_after(" 7 "),
            Some(std::time::Duration::from_secs(7))
        );
        assert_eq!(GeminiBackend::parse_retry_after("Wed, 21 Oct 2015"), None);
    }
}
