//! Pre-flight photo validation.
//!
//! Before spending compositing calls on a photo, [`PhotoValidator`] asks the
//! text model to score how well it will work for try-on: full body visible,
//! neutral pose, even lighting, plain background, clear outline, fitted
//! clothing and resolution.

use crate::client::{GenerationConfig, GenerativeClient};
use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::image::InlineImage;
use crate::output_parser::parse_labeled;
use crate::PipelineError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Minimum score for a photo to count as suitable.
pub const DEFAULT_THRESHOLD: u8 = 80;

const VALIDATION_PROMPT: &str = "Analyze this user photo for virtual try-on compatibility. \
Evaluate the following criteria and provide a score (0-100) for each:\n\n\
1. FULL BODY SHOT (0-100): Does the photo show the person's entire body or at least from chest down?\n\
2. NEUTRAL POSE (0-100): Is the person in a natural, standing pose with arms slightly away from body?\n\
3. GOOD LIGHTING (0-100): Is there clear, even lighting without strong shadows or overexposure?\n\
4. PLAIN BACKGROUND (0-100): Is the background simple and uncluttered?\n\
5. WELL-DEFINED OUTLINE (0-100): Does the person have a clear outline distinct from background?\n\
6. MINIMAL LOOSE CLOTHING (0-100): Is the person wearing minimal, non-baggy clothing?\n\
7. RESOLUTION QUALITY (0-100): Is the image high-resolution with good clarity?\n\n\
Provide your response in this EXACT format:\n\
SCORE: [overall percentage 0-100]\n\
ANALYSIS: [1-2 sentence summary of photo quality and main issues if any]\n\
RECOMMENDATIONS: [specific improvements needed if score < 80]\n\n\
Be strict but fair in your evaluation.";

const LABELS: &[&str] = &["SCORE", "ANALYSIS", "RECOMMENDATIONS"];

/// How suitable a photo is for try-on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoAssessment {
    /// `score >= threshold`.
    pub suitable: bool,
    /// Overall score, 0 to 100.
    pub score: u8,
    pub analysis: String,
    pub recommendations: String,
}

/// Scores user photos with the text model.
#[derive(Debug, Clone)]
pub struct PhotoValidator {
    threshold: u8,
}

impl Default for PhotoValidator {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl PhotoValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the pass mark (clamped to 100).
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold.min(100);
        self
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Score one photo.
    ///
    /// Call failures are returned as errors. A reply without a readable
    /// score counts as 0.
    pub async fn validate(&self, ctx: &ExecCtx, photo: &InlineImage) -> Result<PhotoAssessment> {
        if photo.is_empty() {
            return Err(PipelineError::InvalidInput("photo is empty".to_string()));
        }
        ctx.check_cancelled()?;

        let output = GenerativeClient::new("validate-photo", &ctx.text_model)
            .with_config(GenerationConfig::analysis())
            .invoke(ctx, VALIDATION_PROMPT, vec![photo.clone()])
            .await?;

        let assessment = self.assess(&output.response.text());
        info!(
            score = assessment.score,
            suitable = assessment.suitable,
            "photo validated"
        );
        Ok(assessment)
    }

    /// Interpret a validation reply.
    pub fn assess(&self, reply: &str) -> PhotoAssessment {
        let fields = match parse_labeled(reply, LABELS) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(error = %e, "validation reply had no labeled fields");
                Default::default()
            }
        };

        let score = fields
            .integer("SCORE")
            .map(|s| s.clamp(0, 100) as u8)
            .unwrap_or(0);

        PhotoAssessment {
            suitable: score >= self.threshold,
            score,
            analysis: fields
                .get("ANALYSIS")
                .unwrap_or("Unable to analyze photo")
                .to_string(),
            recommendations: fields.get("RECOMMENDATIONS").unwrap_or_default().to_string(),
        }
    }
}
