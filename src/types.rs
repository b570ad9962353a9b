use crate::classifier::CategorySource;
use crate::diagnostics::CallDiagnostics;
use crate::error::Result;
use crate::image::InlineImage;
use crate::PipelineError;
use serde::{Deserialize, Serialize};

/// A catalogue item to be worn by the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Stable identifier (accepted as `sku` on the wire).
    #[serde(alias = "sku")]
    pub id: String,

    /// Display name.
    pub name: String,

    #[serde(default)]
    pub brand: String,

    /// Free-text category, e.g. `"Clothing / Dresses"`.
    #[serde(default)]
    pub category: String,

    /// Product photograph.
    pub image: InlineImage,
}

impl Product {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        image: InlineImage,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            brand: String::new(),
            category: category.into(),
            image,
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }
}

/// Input to one try-on run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRequest {
    /// Photograph of the person.
    pub base_image: InlineImage,

    /// Products to apply, in order.
    pub products: Vec<Product>,
}

impl PipelineRequest {
    pub fn new(base_image: InlineImage, products: Vec<Product>) -> Self {
        Self {
            base_image,
            products,
        }
    }

    /// Reject requests that could never produce a composite.
    pub fn validate(&self) -> Result<()> {
        if self.products.is_empty() {
            return Err(PipelineError::InvalidInput(
                "at least one product is required".to_string(),
            ));
        }
        if self.base_image.is_empty() {
            return Err(PipelineError::InvalidInput(
                "base image is empty".to_string(),
            ));
        }
        for (i, product) in self.products.iter().enumerate() {
            if product.id.trim().is_empty() {
                return Err(PipelineError::InvalidInput(format!(
                    "product {} has an empty id",
                    i
                )));
            }
            if product.name.trim().is_empty() {
                return Err(PipelineError::InvalidInput(format!(
                    "product {} ({}) has an empty name",
                    i, product.id
                )));
            }
            if product.image.is_empty() {
                return Err(PipelineError::InvalidInput(format!(
                    "product {} ({}) has an empty image",
                    i, product.id
                )));
            }
        }
        Ok(())
    }
}

/// One entry in the visual history of a run.
///
/// Iteration 0 is the untouched base image; iteration `k` is the output of
/// step `k - 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub step_index: usize,
    pub label: String,
    pub image: InlineImage,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

impl Iteration {
    /// The seed iteration.
    pub fn original(image: InlineImage) -> Self {
        Self {
            step_index: 0,
            label: "Original".to_string(),
            image,
            description: "Original photo".to_string(),
            product_id: None,
        }
    }
}

/// Record of one attempted compositing step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// 0-based product index.
    pub step_index: usize,
    pub product_id: String,
    pub success: bool,
    /// Output size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// All text fragments returned by the model, verbatim.
    pub raw_text: String,
    /// Canonical category term used in the prompt.
    pub category: String,
    pub category_source: CategorySource,
    /// Human-readable failure cause, when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(default)]
    pub diagnostics: CallDiagnostics,
}

/// Outcome of a run in which every step succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// Output of the last step.
    pub final_image: InlineImage,
    pub step_results: Vec<StepResult>,
    /// `step_results.len() + 1` entries.
    pub iterations: Vec<Iteration>,
    /// Exact prompt sent for each step, in order.
    pub prompts_used: Vec<String>,
}

/// What a run had accumulated when it aborted.
///
/// Holds the failed step's result as its last entry and never a final image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialRun {
    pub step_results: Vec<StepResult>,
    pub iterations: Vec<Iteration>,
    pub prompts_used: Vec<String>,
}
