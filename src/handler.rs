//! JSON boundary for the try-on pipeline.
//!
//! [`TryOnHandler`] takes a request body as a client application sends it,
//! runs the pipeline and produces a status code plus JSON body. It does no
//! routing and owns no server; wire it into whatever HTTP framework hosts it.
//!
//! Request:
//!
//! ```json
//! { "baseImage": "data:image/jpeg;base64,...",
//!   "products": [{ "sku": "A1", "name": "Wrap Dress", "brand": "Acme",
//!                  "category": "Clothing / Dresses", "image": "data:..." }] }
//! ```
//!
//! `userPhoto` is accepted in place of `baseImage`, `id` in place of `sku`.

use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::image::InlineImage;
use crate::pipeline::TryOnPipeline;
use crate::types::{PipelineRequest, PipelineResult, Product};
use crate::PipelineError;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

/// Wire shape of a try-on request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnRequestBody {
    #[serde(alias = "userPhoto")]
    pub base_image: InlineImage,
    #[serde(default)]
    pub products: Vec<Product>,
}

impl From<TryOnRequestBody> for PipelineRequest {
    fn from(body: TryOnRequestBody) -> Self {
        PipelineRequest::new(body.base_image, body.products)
    }
}

/// Status code and JSON body to send back.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status: u16,
    pub body: Value,
}

impl HandlerResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn ok(result: &PipelineResult) -> Self {
        Self {
            status: 200,
            body: json!({
                "success": true,
                "finalImage": result.final_image,
                "stepResults": result.step_results,
                "iterations": result.iterations,
                "promptsUsed": result.prompts_used,
            }),
        }
    }

    /// Map any pipeline error to a response.
    ///
    /// Input errors are 400, configuration errors 500, step failures 502,
    /// cancellation 499 and anything else 500. A step failure carries the
    /// results and iterations accumulated before it; no response built here
    /// ever contains a final image.
    pub fn from_error(err: &PipelineError) -> Self {
        let (status, kind) = match err {
            PipelineError::InvalidInput(_) => (400, "invalidInput"),
            e if e.is_pre_flight() => (500, "config"),
            PipelineError::StepFailed { .. } => (502, "stepFailed"),
            PipelineError::Cancelled => (499, "cancelled"),
            _ => (500, "internal"),
        };

        let mut body = json!({
            "success": false,
            "error": err.to_string(),
            "kind": kind,
            "stepResults": [],
            "iterations": [],
        });

        if let PipelineError::StepFailed {
            index,
            reason,
            partial,
        } = err
        {
            body["failedStep"] = json!(index);
            body["reason"] = json!(reason);
            body["stepResults"] = json!(partial.step_results);
            body["iterations"] = json!(partial.iterations);
        }

        Self { status, body }
    }
}

/// Runs try-on requests arriving as JSON.
#[derive(Debug, Clone, Default)]
pub struct TryOnHandler {
    pipeline: TryOnPipeline,
}

impl TryOnHandler {
    pub fn new(pipeline: TryOnPipeline) -> Self {
        Self { pipeline }
    }

    /// Decode a request body. Shape errors are [`PipelineError::InvalidInput`].
    pub fn parse_request(body: Value) -> Result<PipelineRequest> {
        let body: TryOnRequestBody = serde_json::from_value(body)
            .map_err(|e| PipelineError::InvalidInput(format!("invalid request body: {}", e)))?;
        Ok(body.into())
    }

    /// Handle one request end to end.
    pub async fn handle(&self, ctx: &ExecCtx, body: Value) -> HandlerResponse {
        let outcome = match Self::parse_request(body) {
            Ok(request) => self.pipeline.run(ctx, &request).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => {
                info!(steps = result.step_results.len(), "try-on request succeeded");
                HandlerResponse::ok(&result)
            }
            Err(e) => {
                let response = HandlerResponse::from_error(&e);
                error!(status = response.status, error = %e, "try-on request failed");
                response
            }
        }
    }

    /// Handle a raw JSON string.
    pub async fn handle_str(&self, ctx: &ExecCtx, body: &str) -> HandlerResponse {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => self.handle(ctx, value).await,
            Err(e) => HandlerResponse::from_error(&PipelineError::InvalidInput(format!(
                "request body is not JSON: {}",
                e
            ))),
        }
    }
}
