//! Sequential try-on orchestration.
//!
//! [`TryOnPipeline::run`] applies products one at a time. Each step is fed
//! the image produced by the step before it, so the final image carries
//! every product. The run is a fold over the product list: a [`RunState`]
//! is threaded through every step and either grows by one iteration or is
//! turned into the [`PartialRun`] of a [`PipelineError::StepFailed`].

use crate::classifier::{CategoryClassifier, CategoryTerm};
use crate::error::Result;
use crate::events::{emit, Event};
use crate::exec_ctx::ExecCtx;
use crate::image::InlineImage;
use crate::step::{StepExecutor, StepOutcome};
use crate::types::{Iteration, PartialRun, PipelineRequest, PipelineResult, Product, StepResult};
use crate::PipelineError;
use tracing::{info, warn};

/// Accumulator threaded through the steps of one run.
#[derive(Debug)]
struct RunState {
    current: InlineImage,
    step_results: Vec<StepResult>,
    iterations: Vec<Iteration>,
    prompts_used: Vec<String>,
}

impl RunState {
    fn seed(base_image: &InlineImage, steps: usize) -> Self {
        let mut iterations = Vec::with_capacity(steps + 1);
        iterations.push(Iteration::original(base_image.clone()));
        Self {
            current: base_image.clone(),
            step_results: Vec::with_capacity(steps),
            iterations,
            prompts_used: Vec::with_capacity(steps),
        }
    }

    fn into_partial(self) -> PartialRun {
        PartialRun {
            step_results: self.step_results,
            iterations: self.iterations,
            prompts_used: self.prompts_used,
        }
    }

    fn finish(self) -> PipelineResult {
        PipelineResult {
            final_image: self.current,
            step_results: self.step_results,
            iterations: self.iterations,
            prompts_used: self.prompts_used,
        }
    }
}

/// Drives a full try-on run.
///
/// Holds no per-run state; one instance can serve any number of
/// concurrent runs.
///
/// # Example
///
/// ```
/// use tryon_pipeline::{ExecCtx, InlineImage, MockBackend, MockReply, PipelineRequest, Product, TryOnPipeline};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let mock = MockBackend::fixed(MockReply::image("image/png", vec![7, 7], "Done."));
/// let ctx = ExecCtx::builder("http://unused").backend(Arc::new(mock)).build().unwrap();
///
/// let request = PipelineRequest::new(
///     InlineImage::new("image/jpeg", vec![1, 2, 3]),
///     vec![Product::new("sku-1", "Wrap Dress", "Clothing / Dresses", InlineImage::new("image/jpeg", vec![4]))],
/// );
///
/// let result = TryOnPipeline::local().run(&ctx, &request).await.unwrap();
/// assert_eq!(result.iterations.len(), 2);
/// assert_eq!(result.final_image.bytes(), &[7, 7]);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct TryOnPipeline {
    classifier: CategoryClassifier,
    executor: StepExecutor,
}

impl TryOnPipeline {
    /// Pipeline that classifies categories with the text model.
    pub fn new() -> Self {
        Self {
            classifier: CategoryClassifier::new(),
            executor: StepExecutor::new(),
        }
    }

    /// Pipeline that derives categories locally, one model call per product.
    pub fn local() -> Self {
        Self {
            classifier: CategoryClassifier::local(),
            executor: StepExecutor::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: CategoryClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Apply every product in order, aborting on the first failed step.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidInput`] before any call if the request is unusable.
    /// - [`PipelineError::StepFailed`] with the accumulated [`PartialRun`] when a step fails.
    /// - [`PipelineError::Cancelled`] if the context's flag is raised.
    pub async fn run(&self, ctx: &ExecCtx, request: &PipelineRequest) -> Result<PipelineResult> {
        request.validate()?;

        let total_steps = request.products.len();
        info!(total_steps, backend = ctx.backend.name(), "try-on run started");
        emit(&ctx.event_handler, Event::PipelineStart { total_steps });

        let mut state = RunState::seed(&request.base_image, total_steps);
        for (index, product) in request.products.iter().enumerate() {
            state = match self.apply(ctx, index, product, state).await {
                Ok(next) => next,
                Err(e) => {
                    let steps_completed = match &e {
                        PipelineError::StepFailed { partial, .. } => partial.iterations.len() - 1,
                        _ => index,
                    };
                    emit(
                        &ctx.event_handler,
                        Event::PipelineEnd {
                            ok: false,
                            steps_completed,
                        },
                    );
                    return Err(e);
                }
            };
        }

        info!(steps = total_steps, "try-on run finished");
        emit(
            &ctx.event_handler,
            Event::PipelineEnd {
                ok: true,
                steps_completed: total_steps,
            },
        );
        Ok(state.finish())
    }

    /// One fold step: classify, composite, record.
    async fn apply(
        &self,
        ctx: &ExecCtx,
        index: usize,
        product: &Product,
        mut state: RunState,
    ) -> Result<RunState> {
        ctx.check_cancelled()?;
        let category = self.classifier.classify(ctx, index, product).await;
        emit(
            &ctx.event_handler,
            Event::Classified {
                step: index,
                product_id: product.id.clone(),
                term: category.term.clone(),
                source: category.source,
            },
        );

        ctx.check_cancelled()?;
        emit(
            &ctx.event_handler,
            Event::StepStart {
                step: index,
                product_id: product.id.clone(),
            },
        );

        let execution = self
            .executor
            .execute_step(ctx, index, &state.current, product, &category)
            .await?;
        state.prompts_used.push(execution.prompt);

        match execution.outcome {
            StepOutcome::Success {
                image,
                mime_type,
                text,
            } => {
                info!(
                    step = index,
                    product_id = %product.id,
                    image_bytes = image.len(),
                    retries = execution.diagnostics.transport_retries,
                    "step succeeded"
                );
                state.step_results.push(StepResult {
                    step_index: index,
                    product_id: product.id.clone(),
                    success: true,
                    image_size: Some(image.len()),
                    mime_type: Some(mime_type),
                    raw_text: text.clone(),
                    category: category.term.clone(),
                    category_source: category.source,
                    failure: None,
                    diagnostics: execution.diagnostics,
                });
                state.iterations.push(step_iteration(index, product, &category, image.clone(), &text));
                state.current = image;
                emit(&ctx.event_handler, Event::StepEnd { step: index, ok: true });
                Ok(state)
            }
            StepOutcome::Failure { reason, text } => {
                warn!(
                    step = index,
                    product_id = %product.id,
                    %reason,
                    "step failed, aborting run"
                );
                state.step_results.push(StepResult {
                    step_index: index,
                    product_id: product.id.clone(),
                    success: false,
                    image_size: None,
                    mime_type: None,
                    raw_text: text,
                    category: category.term,
                    category_source: category.source,
                    failure: Some(reason.to_string()),
                    diagnostics: execution.diagnostics,
                });
                emit(&ctx.event_handler, Event::StepEnd { step: index, ok: false });
                Err(PipelineError::StepFailed {
                    index,
                    reason,
                    partial: Box::new(state.into_partial()),
                })
            }
        }
    }
}

fn step_iteration(
    index: usize,
    product: &Product,
    category: &CategoryTerm,
    image: InlineImage,
    text: &str,
) -> Iteration {
    let description = if text.trim().is_empty() {
        format!("Added {} ({})", product.name, category.term)
    } else {
        text.trim().to_string()
    };
    Iteration {
        step_index: index + 1,
        label: format!("Step {}: {}", index + 1, product.name),
        image,
        description,
        product_id: Some(product.id.clone()),
    }
}
