//! Example: a two-product try-on run against MockBackend, no live service.
//!
//! Run with: `cargo run --example mock_try_on`

use std::sync::Arc;

use tryon_pipeline::events::{Event, FnEventHandler};
use tryon_pipeline::{
    ExecCtx, InlineImage, MockBackend, MockReply, PipelineError, PipelineRequest, Product,
    TryOnPipeline,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    // Replies in call order: classify, composite, classify, composite
    let mock = MockBackend::new(vec![
        MockReply::text("dress"),
        MockReply::image("image/png", vec![0x89, 0x50, 0x4e, 0x47], "Added the wrap dress."),
        MockReply::text("jacket"),
        MockReply::image("image/png", vec![0x89, 0x50, 0x4e, 0x47, 0x0d], "Layered the denim jacket."),
    ]);

    let ctx = ExecCtx::builder("http://unused")
        .backend(Arc::new(mock))
        .event_handler(Arc::new(FnEventHandler(|event: Event| {
            if let Event::StepEnd { step, ok } = event {
                println!("step {} finished (ok={})", step, ok);
            }
        })))
        .build()?;

    let request = PipelineRequest::new(
        InlineImage::new("image/jpeg", vec![0xff, 0xd8, 0xff]),
        vec![
            Product::new(
                "sku-101",
                "Wrap Dress",
                "Clothing / Dresses",
                InlineImage::new("image/jpeg", vec![1, 2, 3]),
            )
            .with_brand("Acme"),
            Product::new(
                "sku-202",
                "Denim Jacket",
                "Outerwear, Jackets",
                InlineImage::new("image/jpeg", vec![4, 5, 6]),
            ),
        ],
    );

    match TryOnPipeline::new().run(&ctx, &request).await {
        Ok(result) => {
            for it in &result.iterations {
                println!("[{}] {}: {} ({} bytes)", it.step_index, it.label, it.description, it.image.len());
            }
            println!("final image: {} bytes", result.final_image.len());
        }
        Err(PipelineError::StepFailed { index, reason, partial }) => {
            println!("step {} failed: {}", index, reason);
            println!("{} iteration(s) kept", partial.iterations.len());
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
