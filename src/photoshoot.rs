//! Single-shot product photoshoots.
//!
//! A photoshoot takes two calls. First, [`ShootPromptWriter`] has the text
//! model, acting as creative director, fill a studio or lifestyle brief out
//! into a complete image prompt. Then [`Photoshoot::generate`] sends that
//! prompt with the product images to the image model and keeps the first
//! image returned.
//!
//! Unlike a try-on step there is no source photo: the model invents the
//! scene and the person, and only the products must stay exactly as shown.

use crate::client::{GenerationConfig, GenerativeClient};
use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::image::InlineImage;
use crate::inspiration::SceneInspiration;
use crate::prompt::{numbered_list, render};
use crate::step::{StepExecution, StepOutcome};
use crate::types::Product;
use crate::PipelineError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Appended to every photoshoot prompt.
pub const FIDELITY_RULE: &str = "IMPORTANT: The products in the images provided MUST be used \
exactly as they are. Do not alter, modify, or replace any product details, shapes, or colors. \
Replicate them perfectly in the final image.";

const STUDIO_SYSTEM: &str = "You are a creative director. Your task is to complete the user's \
prompt by providing a creative description. The user will provide a template with a placeholder. \
Replace the placeholder with your description for a luxury e-commerce studio photoshoot. Focus on \
the model's pose, professional lighting, and camera details. Be concise and professional. Reply \
with the completed prompt only.";

const LIFESTYLE_SYSTEM: &str = "You are a creative director. Your task is to complete the user's \
prompt by providing a creative description. The user will provide a template with a placeholder. \
Replace the placeholder with your description for a luxury lifestyle fashion shoot based on the \
user's creative context. Reply with the completed prompt only.";

const STUDIO_BRIEF: &str = "Complete the following prompt by replacing the placeholder:\n\n\
A photorealistic full-body studio photograph of a model wearing the following exact products. \
It is critical these products are not altered in any way:\n{products}\n\
[YOUR CREATIVE DESCRIPTION HERE: Describe the model's elegant pose, the bright and professional \
lighting, camera details, and the seamless light grey background.]";

const LIFESTYLE_BRIEF: &str = "Complete the following prompt by replacing the placeholder:\n\n\
A photorealistic lifestyle photograph of a fashion model wearing the following exact products. \
It is critical these products are not altered in any way:\n{products}\n\
The scene is '{location}' with a '{mood}' mood.\n\
[YOUR CREATIVE DESCRIPTION HERE: Describe the model's specific action, the lighting corresponding \
to '{time}', and camera details like lens and aperture to bring the scene to life.]";

/// Where a lifestyle shoot takes place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifestyleScene {
    pub location: String,
    pub mood: String,
    pub time: String,
}

impl LifestyleScene {
    pub fn new(
        location: impl Into<String>,
        mood: impl Into<String>,
        time: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            mood: mood.into(),
            time: time.into(),
        }
    }
}

impl TryFrom<&SceneInspiration> for LifestyleScene {
    type Error = PipelineError;

    /// Location, mood and time must all be present; `extra` is not used.
    fn try_from(scene: &SceneInspiration) -> Result<Self> {
        let field = |value: &Option<String>, name: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| PipelineError::InvalidInput(format!("scene has no {}", name)))
        };
        Ok(Self {
            location: field(&scene.location, "location")?,
            mood: field(&scene.mood, "mood")?,
            time: field(&scene.time, "time")?,
        })
    }
}

/// Kind of photoshoot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ShootStyle {
    /// Plain studio, light grey background.
    Studio,
    /// On location.
    Lifestyle(LifestyleScene),
}

/// One line per product: `Name by Brand (category)`.
fn product_list(products: &[Product]) -> String {
    let items: Vec<String> = products
        .iter()
        .map(|p| {
            let mut line = p.name.trim().to_string();
            if !p.brand.trim().is_empty() {
                line.push_str(&format!(" by {}", p.brand.trim()));
            }
            if !p.category.trim().is_empty() {
                line.push_str(&format!(" ({})", p.category.trim()));
            }
            line
        })
        .collect();
    numbered_list(&items)
}

/// Turns a shoot style into a finished image prompt.
#[derive(Debug, Clone)]
pub struct ShootPromptWriter {
    config: GenerationConfig,
}

impl Default for ShootPromptWriter {
    fn default() -> Self {
        Self {
            config: GenerationConfig::default(),
        }
    }
}

impl ShootPromptWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// System instruction and user brief for `style`.
    pub fn brief(style: &ShootStyle, products: &[Product]) -> (&'static str, String) {
        let products = product_list(products);
        match style {
            ShootStyle::Studio => (
                STUDIO_SYSTEM,
                render(STUDIO_BRIEF, &[("products", products.as_str())]),
            ),
            ShootStyle::Lifestyle(scene) => (
                LIFESTYLE_SYSTEM,
                render(
                    LIFESTYLE_BRIEF,
                    &[
                        ("products", products.as_str()),
                        ("location", scene.location.as_str()),
                        ("mood", scene.mood.as_str()),
                        ("time", scene.time.as_str()),
                    ],
                ),
            ),
        }
    }

    /// Ask the text model to complete the brief.
    ///
    /// An empty reply is [`PipelineError::MalformedResponse`].
    pub async fn write(
        &self,
        ctx: &ExecCtx,
        style: &ShootStyle,
        products: &[Product],
    ) -> Result<String> {
        if products.is_empty() {
            return Err(PipelineError::InvalidInput(
                "at least one product is required".to_string(),
            ));
        }
        ctx.check_cancelled()?;

        let (system, brief) = Self::brief(style, products);
        let output = GenerativeClient::new("shoot-prompt", &ctx.text_model)
            .with_config(self.config.clone())
            .with_system(system)
            .invoke(ctx, &brief, Vec::new())
            .await?;

        let raw = output.response.text();
        let prompt = raw.trim().trim_matches('"').trim();
        if prompt.is_empty() {
            return Err(PipelineError::MalformedResponse {
                reason: "empty photoshoot prompt".to_string(),
                raw,
            });
        }
        Ok(prompt.to_string())
    }
}

/// Generates product photoshoot images.
#[derive(Debug, Clone)]
pub struct Photoshoot {
    writer: ShootPromptWriter,
    config: GenerationConfig,
}

impl Default for Photoshoot {
    fn default() -> Self {
        Self {
            writer: ShootPromptWriter::default(),
            config: GenerationConfig::photoshoot(),
        }
    }
}

impl Photoshoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_writer(mut self, writer: ShootPromptWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// `prompt` with [`FIDELITY_RULE`] appended.
    pub fn final_prompt(prompt: &str) -> String {
        format!("{}. {}", prompt.trim().trim_end_matches('.'), FIDELITY_RULE)
    }

    /// Generate one image from `prompt` and the product `images`.
    ///
    /// Like a try-on step, a reply without an image is a failed outcome,
    /// not an `Err`. `Err` is reserved for bad input, cancellation and
    /// configuration problems.
    pub async fn generate(
        &self,
        ctx: &ExecCtx,
        prompt: &str,
        images: &[InlineImage],
    ) -> Result<StepExecution> {
        if prompt.trim().is_empty() {
            return Err(PipelineError::InvalidInput("prompt is empty".to_string()));
        }
        if images.is_empty() {
            return Err(PipelineError::InvalidInput(
                "at least one product image is required".to_string(),
            ));
        }
        if images.iter().any(InlineImage::is_empty) {
            return Err(PipelineError::InvalidInput(
                "product image is empty".to_string(),
            ));
        }
        ctx.check_cancelled()?;

        let prompt = Self::final_prompt(prompt);
        let result = GenerativeClient::new("photoshoot", &ctx.image_model)
            .with_config(self.config.clone())
            .invoke(ctx, &prompt, images.to_vec())
            .await;
        let execution = StepExecution::from_call(prompt, result)?;

        match &execution.outcome {
            StepOutcome::Success { .. } => info!(images = images.len(), "photoshoot image generated"),
            StepOutcome::Failure { reason, .. } => warn!(%reason, "photoshoot produced no image"),
        }
        Ok(execution)
    }

    /// Write a prompt for `style`, then generate with the products' images.
    pub async fn shoot(
        &self,
        ctx: &ExecCtx,
        style: &ShootStyle,
        products: &[Product],
    ) -> Result<StepExecution> {
        let prompt = self.writer.write(ctx, style, products).await?;
        let images: Vec<InlineImage> = products.iter().map(|p| p.image.clone()).collect();
        self.generate(ctx, &prompt, &images).await
    }
}
