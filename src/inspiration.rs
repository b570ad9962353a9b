//! Scene suggestions for lifestyle shots.
//!
//! [`SceneInspirer`] shows the product images to the model and asks where,
//! in what mood and at what time of day they would best be photographed.

use crate::client::{GenerationConfig, GenerativeClient};
use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::image::InlineImage;
use crate::output_parser::parse_labeled;
use crate::PipelineError;
use serde::{Deserialize, Serialize};
use tracing::debug;

const INSPIRATION_PROMPT: &str = "You are a fashion photography art director. \
Study the clothing, shoes and accessories in these images: their colours, style, \
formality and overall aesthetic. Then propose the ideal lifestyle scene for them.\n\n\
Be specific. The location should name a city or country and, where it fits, a landmark \
or district. The mood should be two or three descriptive sentences. The time should say \
which light best shows the products' colours and textures. Extra details may cover \
weather, props, activities or background elements.\n\n\
Answer in exactly this format:\n\
1. LOCATION: [where]\n\
2. MOOD: [the atmosphere]\n\
3. TIME: [time of day and light]\n\
4. EXTRA: [additional scene details]";

const LABELS: &[&str] = &["LOCATION", "MOOD", "TIME", "EXTRA"];

/// A suggested scene. Fields the model left out are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneInspiration {
    pub location: Option<String>,
    pub mood: Option<String>,
    pub time: Option<String>,
    pub extra: Option<String>,
}

impl SceneInspiration {
    /// Parse a reply. At least one field must be present.
    pub fn from_reply(reply: &str) -> Result<Self> {
        let fields = parse_labeled(reply, LABELS).map_err(|e| PipelineError::MalformedResponse {
            reason: e.to_string(),
            raw: reply.to_string(),
        })?;
        let get = |label: &str| fields.get(label).map(str::to_string);
        Ok(Self {
            location: get("LOCATION"),
            mood: get("MOOD"),
            time: get("TIME"),
            extra: get("EXTRA"),
        })
    }

    /// Whether all four fields were answered.
    pub fn is_complete(&self) -> bool {
        self.location.is_some() && self.mood.is_some() && self.time.is_some() && self.extra.is_some()
    }
}

/// Suggests photoshoot scenes for a set of products.
#[derive(Debug, Clone)]
pub struct SceneInspirer {
    config: GenerationConfig,
}

impl Default for SceneInspirer {
    fn default() -> Self {
        Self {
            config: GenerationConfig::default().with_max_output_tokens(2048),
        }
    }
}

impl SceneInspirer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Ask the image model for a scene matching `images`.
    pub async fn inspire(&self, ctx: &ExecCtx, images: &[InlineImage]) -> Result<SceneInspiration> {
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

        let output = GenerativeClient::new("inspire", &ctx.image_model)
            .with_config(self.config.clone())
            .invoke(ctx, INSPIRATION_PROMPT, images.to_vec())
            .await?;

        let scene = SceneInspiration::from_reply(&output.response.text())?;
        debug!(complete = scene.is_complete(), "scene inspiration parsed");
        Ok(scene)
    }
}
