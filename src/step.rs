//! One compositing step.
//!
//! [`StepExecutor::execute_step`] asks the image model to put one product on
//! the subject of the current image and interprets the reply. A reply with
//! no image part is a normal, typed outcome ([`StepFailure::NoImage`]), not
//! an error: the model's explanation is kept verbatim for the caller.

use crate::classifier::CategoryTerm;
use crate::client::{CallOutput, GenerationConfig, GenerativeClient};
use crate::diagnostics::CallDiagnostics;
use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::image::InlineImage;
use crate::output_parser::error::truncate;
use crate::output_parser::{parse_refusal, Refusal};
use crate::prompt::render;
use crate::types::Product;
use crate::PipelineError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const STEP_TEMPLATE: &str = "You are editing a photo for a virtual try-on.\n\
The first image shows a person. The second image shows a {category} ({name}{brand_suffix}).\n\
Dress the person in the first image with the {category} from the second image.\n\
Preserve the person's identity, face, body shape, pose, background, lighting and framing exactly as they are.\n\
Reproduce the {category} exactly as shown: same colours, pattern, material, logos and proportions. \
Do not stylize, reinterpret or substitute it.\n\
Keep everything else the person is already wearing unless the {category} replaces it.\n\
Return the edited photo as an image, together with a one-sentence text description of the change.";

/// Why a step produced no usable image.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepFailure {
    /// The retry budget ran out on HTTP 429.
    #[error("rate limited after {attempts} attempt(s)")]
    RateLimited { attempts: u32 },

    /// The service answered with a non-success status.
    #[error("service returned HTTP {status}: {body}")]
    Service { status: u16, body: String },

    /// The service answered 2xx with a body that could not be decoded.
    #[error("malformed service response")]
    MalformedResponse { raw: String },

    /// The request never completed (connection, timeout, TLS).
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The model answered without an image part.
    #[error("{}", no_image_message(.text))]
    NoImage {
        /// All text fragments of the reply.
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refusal: Option<Refusal>,
    },
}

/// Longest slice of the model's explanation kept in the error message.
const NO_IMAGE_TEXT_CHARS: usize = 300;

fn no_image_message(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        "model returned no image".to_string()
    } else {
        format!("model returned no image: {}", truncate(text, NO_IMAGE_TEXT_CHARS))
    }
}

impl StepFailure {
    /// Convert a call error into a step failure.
    ///
    /// Cancellation and configuration problems are not step failures and
    /// are handed back unchanged.
    pub fn from_call_error(error: PipelineError) -> std::result::Result<Self, PipelineError> {
        match error {
            PipelineError::Cancelled | PipelineError::Config(_) => Err(error),
            PipelineError::RateLimited { attempts, .. } => Ok(StepFailure::RateLimited { attempts }),
            PipelineError::Service { status, body } => Ok(StepFailure::Service { status, body }),
            PipelineError::MalformedResponse { raw, .. } => Ok(StepFailure::MalformedResponse { raw }),
            other => Ok(StepFailure::Transport {
                message: other.to_string(),
            }),
        }
    }
}

/// Result of interpreting one step reply.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Success {
        image: InlineImage,
        mime_type: String,
        /// Explanatory text returned alongside the image.
        text: String,
    },
    Failure {
        reason: StepFailure,
        text: String,
    },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success { .. })
    }

    pub fn text(&self) -> &str {
        match self {
            StepOutcome::Success { text, .. } | StepOutcome::Failure { text, .. } => text,
        }
    }
}

/// Everything one step produced.
#[derive(Debug, Clone)]
pub struct StepExecution {
    /// The exact prompt sent.
    pub prompt: String,
    pub outcome: StepOutcome,
    pub diagnostics: CallDiagnostics,
}

impl StepExecution {
    /// Interpret the result of an image-producing call.
    ///
    /// The first image part wins. A reply without one becomes
    /// [`StepFailure::NoImage`] with its text and refusal classification.
    /// Call errors become failures too, except cancellation and
    /// configuration errors, which are returned as `Err`.
    pub(crate) fn from_call(prompt: String, result: Result<CallOutput>) -> Result<Self> {
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                return Ok(Self {
                    prompt,
                    outcome: StepOutcome::Failure {
                        reason: StepFailure::from_call_error(e)?,
                        text: String::new(),
                    },
                    diagnostics: CallDiagnostics::default(),
                });
            }
        };

        let text = output.response.text();
        let outcome = match output.response.first_image() {
            Some(image) => StepOutcome::Success {
                image: image.clone(),
                mime_type: image.mime_type().to_string(),
                text,
            },
            None => {
                let refusal = parse_refusal(
                    &text,
                    output.diagnostics.finish_reason.as_deref(),
                    output.diagnostics.block_reason.as_deref(),
                );
                StepOutcome::Failure {
                    reason: StepFailure::NoImage {
                        text: text.clone(),
                        refusal,
                    },
                    text,
                }
            }
        };

        Ok(Self {
            prompt,
            outcome,
            diagnostics: output.diagnostics,
        })
    }
}

/// Runs single compositing steps.
#[derive(Debug, Clone, Default)]
pub struct StepExecutor;

impl StepExecutor {
    pub fn new() -> Self {
        Self
    }

    /// The compositing instruction for one product.
    pub fn build_prompt(product: &Product, category: &CategoryTerm) -> String {
        let brand_suffix = if product.brand.trim().is_empty() {
            String::new()
        } else {
            format!(" by {}", product.brand.trim())
        };
        render(
            STEP_TEMPLATE,
            &[
                ("category", category.term.as_str()),
                ("name", product.name.as_str()),
                ("brand_suffix", brand_suffix.as_str()),
            ],
        )
    }

    /// Apply `product` to `current`.
    ///
    /// Sends `[prompt, current, product.image]` to the image model. Returns
    /// `Err` only for cancellation and configuration errors; every other
    /// problem becomes a [`StepOutcome::Failure`].
    pub async fn execute_step(
        &self,
        ctx: &ExecCtx,
        step: usize,
        current: &InlineImage,
        product: &Product,
        category: &CategoryTerm,
    ) -> Result<StepExecution> {
        let prompt = Self::build_prompt(product, category);
        let call = GenerativeClient::new(format!("step-{}", step), &ctx.image_model)
            .with_config(GenerationConfig::compositing());

        let images = vec![current.clone(), product.image.clone()];
        let result = call.invoke(ctx, &prompt, images).await;
        let execution = StepExecution::from_call(prompt, result)?;

        if let StepOutcome::Failure { reason, .. } = &execution.outcome {
            debug!(step, product_id = %product.id, %reason, "compositing step failed");
        }
        Ok(execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockReply, Part};
    use crate::classifier::CategorySource;
    use crate::output_parser::RefusalKind;
    use std::sync::Arc;

    fn product() -> Product {
        Product::new(
            "p1",
            "Linen Blazer",
            "Outerwear / Blazers",
            InlineImage::new("image/jpeg", vec![5u8, 5, 5]),
        )
        .with_brand("Acme")
    }

    fn term(t: &str) -> CategoryTerm {
        CategoryTerm {
            term: t.to_string(),
            source: CategorySource::Model,
        }
    }

    fn ctx_with(mock: Arc<MockBackend>) -> ExecCtx {
        ExecCtx::builder("http://unused").backend(mock).build().unwrap()
    }

    #[test]
    fn test_prompt_contents() {
        let prompt = StepExecutor::build_prompt(&product(), &term("blazer"));
        assert!(prompt.contains("blazer (Linen Blazer by Acme)"));
        assert!(prompt.contains("identity"));
        assert!(prompt.contains("exactly as shown"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_prompt_without_brand() {
        let mut p = product();
        p.brand = String::new();
        let prompt = StepExecutor::build_prompt(&p, &term("blazer"));
        assert!(prompt.contains("blazer (Linen Blazer)"));
    }

    #[tokio::test]
    async fn test_success_takes_first_image() {
        let out1 = InlineImage::new("image/png", vec![1u8]);
        let out2 = InlineImage::new("image/png", vec![2u8]);
        let mock = Arc::new(MockBackend::fixed(MockReply::Parts(vec![
            Part::Text("Added ".into()),
            Part::Image(out1.clone()),
            Part::Text("the blazer.".into()),
            Part::Image(out2),
        ])));
        let ctx = ctx_with(mock.clone());
        let current = InlineImage::new("image/jpeg", vec![9u8; 4]);
        let p = product();

        let exec = StepExecutor::new()
            .execute_step(&ctx, 0, &current, &p, &term("blazer"))
            .await
            .unwrap();

        match exec.outcome {
            StepOutcome::Success { image, mime_type, text } => {
                assert!(image.is_same(&out1));
                assert_eq!(mime_type, "image/png");
                assert_eq!(text, "Added the blazer.");
            }
            other => panic!("expected success, got {:?}", other),
        }

        let request = &mock.requests()[0];
        assert_eq!(request.prompt, exec.prompt);
        assert_eq!(request.model, ctx.image_model);
        assert!(request.images[0].is_same(&current));
        assert!(request.images[1].is_same(&p.image));
    }

    #[tokio::test]
    async fn test_text_only_reply_is_no_image() {
        let mock = Arc::new(MockBackend::fixed(MockReply::text(
            "I can't modify images of real people due to policy.",
        )));
        let ctx = ctx_with(mock);
        let current = InlineImage::new("image/jpeg", vec![9u8]);

        let exec = StepExecutor::new()
            .execute_step(&ctx, 1, &current, &product(), &term("blazer"))
            .await
            .unwrap();

        match exec.outcome {
            StepOutcome::Failure {
                reason: StepFailure::NoImage { text, refusal },
                ..
            } => {
                assert_eq!(text, "I can't modify images of real people due to policy.");
                assert_eq!(refusal.unwrap().kind, RefusalKind::Identity);
            }
            other => panic!("expected NoImage, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_service_error_becomes_failure() {
        let mock = Arc::new(MockBackend::fixed(MockReply::Status(400, "bad image".into())));
        let ctx = ctx_with(mock);
        let current = InlineImage::new("image/jpeg", vec![9u8]);

        let exec = StepExecutor::new()
            .execute_step(&ctx, 0, &current, &product(), &term("blazer"))
            .await
            .unwrap();

        assert!(!exec.outcome.is_success());
        assert!(matches!(
            exec.outcome,
            StepOutcome::Failure {
                reason: StepFailure::Service { status: 400, .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_malformed_keeps_raw_body() {
        let mock = Arc::new(MockBackend::fixed(MockReply::Malformed("<html>".into())));
        let ctx = ctx_with(mock);
        let current = InlineImage::new("image/jpeg", vec![9u8]);

        let exec = StepExecutor::new()
            .execute_step(&ctx, 0, &current, &product(), &term("blazer"))
            .await
            .unwrap();

        assert!(matches!(
            exec.outcome,
            StepOutcome::Failure {
                reason: StepFailure::MalformedResponse { ref raw },
                ..
            } if raw == "<html>"
        ));
    }

    #[test]
    fn test_cancel_and_config_propagate() {
        assert!(matches!(
            StepFailure::from_call_error(PipelineError::Cancelled),
            Err(PipelineError::Cancelled)
        ));
        assert!(matches!(
            StepFailure::from_call_error(PipelineError::Config("x".into())),
            Err(PipelineError::Config(_))
        ));
        assert_eq!(
            StepFailure::from_call_error(PipelineError::Other("reset".into())).unwrap(),
            StepFailure::Transport {
                message: "reset".into()
            }
        );
    }

    #[test]
    fn test_no_image_display_keeps_explanation() {
        let failure = StepFailure::NoImage {
            text: "  I can't edit photos of real people.  ".into(),
            refusal: None,
        };
        assert_eq!(
            failure.to_string(),
            "model returned no image: I can't edit photos of real people."
        );

        let silent = StepFailure::NoImage {
            text: String::new(),
            refusal: None,
        };
        assert_eq!(silent.to_string(), "model returned no image");

        let long = StepFailure::NoImage {
            text: "x".repeat(1000),
            refusal: None,
        };
        assert!(long.to_string().len() < 400);
        assert!(long.to_string().ends_with("..."));
    }

    #[test]
    fn test_failure_wire_shape() {
        let json = serde_json::to_value(StepFailure::RateLimited { attempts: 3 }).unwrap();
        assert_eq!(json["kind"], "rateLimited");
        assert_eq!(json["attempts"], 3);
    }
}
