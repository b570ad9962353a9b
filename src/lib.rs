//! # Try-On Pipeline
//!
//! Sequential virtual try-on compositing over a generative image service.
//!
//! Given a photo of a person and an ordered list of products, the pipeline
//! applies the products one at a time. Each step sends the *previous step's
//! output* back to the model with the next product, so the final image
//! carries every item and every intermediate image is kept as provenance.
//!
//! ## Core Concepts
//!
//! - **[`TryOnPipeline`]**: the orchestrator. Validates the request, folds
//!   over the products, aborts on the first failed step with a
//!   [`PartialRun`](types::PartialRun).
//! - **[`CategoryClassifier`]**: reduces a verbose category to one word,
//!   with a deterministic local fallback.
//! - **[`StepExecutor`]**: one compositing call and its interpretation.
//! - **[`GenerativeClient`]**: the only path to the model; retries rate
//!   limiting and nothing else.
//! - **[`ExecCtx`]**: shared execution context (HTTP client, backend,
//!   models, backoff, cancellation, optional event handler).
//!
//! Alongside the pipeline: [`PhotoValidator`] scores a photo before a run,
//! [`SceneInspirer`] suggests a photoshoot scene, [`Photoshoot`] renders
//! studio or lifestyle product shots, and [`TryOnHandler`] maps JSON
//! request bodies to responses and status codes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tryon_pipeline::{ExecCtx, InlineImage, PipelineRequest, Product, TryOnPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY and the optional GEMINI_* overrides.
//!     let ctx = ExecCtx::from_env()?;
//!
//!     let photo = InlineImage::new("image/jpeg", std::fs::read("me.jpg")?);
//!     let dress = Product::new(
//!         "sku-1",
//!         "Wrap Dress",
//!         "Clothing / Dresses",
//!         InlineImage::new("image/jpeg", std::fs::read("dress.jpg")?),
//!     );
//!
//!     let result = TryOnPipeline::new()
//!         .run(&ctx, &PipelineRequest::new(photo, vec![dress]))
//!         .await?;
//!     std::fs::write("out.png", result.final_image.bytes())?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod classifier;
pub mod client;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod exec_ctx;
pub mod handler;
pub mod image;
pub mod inspiration;
pub mod output_parser;
pub mod photoshoot;
pub mod pipeline;
pub mod prompt;
pub mod step;
pub mod types;
pub mod validation;

pub use backend::{Backend, BackoffConfig, GeminiBackend, MockBackend, MockReply};
pub use classifier::{CategoryClassifier, CategorySource, CategoryTerm};
pub use client::{GenerationConfig, GenerativeClient};
pub use config::ServiceConfig;
pub use diagnostics::CallDiagnostics;
pub use error::{PipelineError, Result};
pub use exec_ctx::{ExecCtx, ExecCtxBuilder};
pub use handler::{HandlerResponse, TryOnHandler};
pub use image::InlineImage;
pub use inspiration::{SceneInspiration, SceneInspirer};
pub use photoshoot::{LifestyleScene, Photoshoot, ShootPromptWriter, ShootStyle};
pub use pipeline::TryOnPipeline;
pub use step::{StepExecutor, StepFailure, StepOutcome};
pub use types::{Iteration, PartialRun, PipelineRequest, PipelineResult, Product, StepResult};
pub use validation::{PhotoAssessment, PhotoValidator};
