//! Event system for pipeline lifecycle hooks.
//!
//! Provides an optional, non-intrusive way to observe a try-on run.
//! The pipeline emits events when it starts, when each product is
//! classified, around every compositing step, and on rate-limit retries.
//! Implement [`EventHandler`] to drive progress bars or thumbnails.

use crate::classifier::CategorySource;
use std::sync::Arc;

/// Events emitted during a pipeline run.
#[derive(Debug, Clone)]
pub enum Event {
    /// A run has started.
    PipelineStart {
        /// Number of compositing steps that will be attempted.
        total_steps: usize,
    },
    /// A product's category was reduced to a canonical term.
    Classified {
        /// 0-based step index.
        step: usize,
        /// Product identifier.
        product_id: String,
        /// The canonical term used in the step prompt.
        term: String,
        /// Whether the term came from the model or the local fallback.
        source: CategorySource,
    },
    /// A compositing step is starting.
    StepStart {
        /// 0-based step index.
        step: usize,
        /// Product identifier.
        product_id: String,
    },
    /// A compositing step has finished.
    StepEnd {
        /// 0-based step index.
        step: usize,
        /// Whether the step produced an image.
        ok: bool,
    },
    /// A rate-limit retry is about to happen.
    TransportRetry {
        /// Name of the call being retried (e.g. `"step-2"`, `"classify-1"`).
        name: String,
        /// The retry attempt number (1-indexed).
        attempt: u32,
        /// Delay before this retry attempt in milliseconds.
        delay_ms: u64,
        /// Reason for the retry (error description).
        reason: String,
    },
    /// A run has finished.
    PipelineEnd {
        /// Whether every step succeeded.
        ok: bool,
        /// Number of steps that produced an image.
        steps_completed: usize,
    },
}

/// Handler for pipeline lifecycle events.
///
/// This is entirely optional -- the pipeline works without an event handler.
///
/// # Example
///
/// ```
/// use tryon_pipeline::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::StepStart { step, product_id } => println!("[step {}] {}", step, product_id),
///             Event::StepEnd { step, ok } => println!("[step {}] ok={}", step, ok),
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called when the pipeline emits an event.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use tryon_pipeline::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::StepEnd { step, ok } = event {
///         println!("step {} ok={}", step, ok);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}
