//! Category classification.
//!
//! Product categories arrive as free text (`"Women > Clothing / Dresses"`).
//! The compositing prompt needs one plain noun. [`CategoryClassifier`] asks
//! the text model for it and falls back to a deterministic local derivation
//! whenever the model is unavailable or answers with something unusable.

use crate::client::{GenerationConfig, GenerativeClient};
use crate::exec_ctx::ExecCtx;
use crate::prompt::render;
use crate::types::Product;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const CLASSIFY_TEMPLATE: &str = "Classify this fashion product into one simple, lowercase \
clothing or accessory word (for example: dress, shirt, jacket, shoes, hat, bag, necklace).\n\
Product name: {name}\n\
Category: {category}\n\
Brand: {brand}\n\
Reply with the single word only.";

/// Where a [`CategoryTerm`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CategorySource {
    /// The model's reply.
    Model,
    /// Local derivation from the category text.
    Fallback,
}

/// A canonical lower-case category word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTerm {
    pub term: String,
    pub source: CategorySource,
}

impl CategoryTerm {
    pub fn fallback(category: &str) -> Self {
        Self {
            term: fallback_category(category),
            source: CategorySource::Fallback,
        }
    }
}

/// Reduces a product's category to a single canonical term.
#[derive(Debug, Clone, Default)]
pub struct CategoryClassifier {
    local_only: bool,
}

impl CategoryClassifier {
    /// Ask the text model, falling back locally on any problem.
    pub fn new() -> Self {
        Self { local_only: false }
    }

    /// Never call the model.
    pub fn local() -> Self {
        Self { local_only: true }
    }

    /// The instruction sent to the text model.
    pub fn build_prompt(product: &Product) -> String {
        render(
            CLASSIFY_TEMPLATE,
            &[
                ("name", product.name.as_str()),
                ("category", product.category.as_str()),
                ("brand", product.brand.as_str()),
            ],
        )
    }

    /// Classify one product. Never fails.
    ///
    /// `step` names the call in retry events and logs. Cancellation during
    /// the call also lands on the fallback; the orchestrator checks the
    /// flag itself before the next step.
    pub async fn classify(&self, ctx: &ExecCtx, step: usize, product: &Product) -> CategoryTerm {
        if self.local_only {
            return CategoryTerm::fallback(&product.category);
        }

        let call = GenerativeClient::new(format!("classify-{}", step), &ctx.text_model)
            .with_config(GenerationConfig::classification());

        match call.invoke(ctx, &Self::build_prompt(product), Vec::new()).await {
            Ok(output) => match clean_reply(&output.response.text()) {
                Some(term) => {
                    debug!(step, product_id = %product.id, %term, "category classified");
                    CategoryTerm {
                        term,
                        source: CategorySource::Model,
                    }
                }
                None => {
                    warn!(
                        step,
                        product_id = %product.id,
                        "unusable classification reply, using local fallback"
                    );
                    CategoryTerm::fallback(&product.category)
                }
            },
            Err(e) => {
                warn!(
                    step,
                    product_id = %product.id,
                    error = %e,
                    "classification call failed, using local fallback"
                );
                CategoryTerm::fallback(&product.category)
            }
        }
    }
}

/// Normalise a model reply to a single lower-case token.
///
/// Strips whitespace, quotes, bold markers and trailing punctuation.
/// Returns `None` unless what remains is one word of ASCII letters or
/// hyphens, 2 to 32 characters long.
pub fn clean_reply(reply: &str) -> Option<String> {
    let cleaned = reply
        .trim()
        .trim_matches(|c: char| matches!(c, '*' | '"' | '\'' | '`' | '.' | '!' | ',' | ';' | ':'))
        .trim()
        .to_ascii_lowercase();

    let valid = (2..=32).contains(&cleaned.len())
        && cleaned.chars().all(|c| c.is_ascii_lowercase() || c == '-')
        && cleaned.chars().any(|c| c.is_ascii_lowercase());
    valid.then_some(cleaned)
}

/// Deterministic category term derived from free-form category text.
///
/// Takes the last `,`/`/`-separated segment, lower-cases it, collapses
/// whitespace and strips a plural ending. An empty input yields `"item"`.
///
/// ```
/// use tryon_pipeline::classifier::fallback_category;
///
/// assert_eq!(fallback_category("Clothing / Dresses"), "dress");
/// assert_eq!(fallback_category("Accessories, Sunglasses"), "sunglass");
/// assert_eq!(fallback_category(""), "item");
/// ```
pub fn fallback_category(category: &str) -> String {
    let segment = category
        .split([',', '/'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .last()
        .unwrap_or("");

    let collapsed = segment
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let term = singularize(&collapsed);
    if term.is_empty() {
        "item".to_string()
    } else {
        term
    }
}

fn singularize(word: &str) -> String {
    for ending in ["sses", "shes", "ches", "xes", "zes"] {
        if word.ends_with(ending) {
            return word[..word.len() - 2].to_string();
        }
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() && !stem.ends_with('s') => stem.to_string(),
        _ => word.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockReply};
    use crate::image::InlineImage;
    use std::sync::Arc;

    fn product(category: &str) -> Product {
        Product::new("p1", "Floral Midi", category, InlineImage::new("image/png", vec![1u8]))
            .with_brand("Acme")
    }

    fn ctx_with(mock: Arc<MockBackend>) -> ExecCtx {
        ExecCtx::builder("http://unused").backend(mock).build().unwrap()
    }

    #[test]
    fn test_fallback_examples() {
        assert_eq!(fallback_category("Clothing / Dresses"), "dress");
        assert_eq!(fallback_category("Women > Tops, T-Shirts"), "t-shirt");
        assert_eq!(fallback_category("Accessories / Watches"), "watch");
        assert_eq!(fallback_category("Boxes"), "box");
        assert_eq!(fallback_category("Tops / Hoodies"), "hoodie");
        assert_eq!(fallback_category("Accessories / Ties"), "tie");
        assert_eq!(fallback_category("Neckwear, Bow Ties"), "bow tie");
        assert_eq!(fallback_category("Hats / Beanies"), "beanie");
        assert_eq!(fallback_category("Glasses"), "glass");
        assert_eq!(fallback_category("Dress"), "dress");
        assert_eq!(fallback_category("Jeans  Slim / "), "jeans slim");
        assert_eq!(fallback_category(" / , "), "item");
        assert_eq!(fallback_category("Bags"), "bag");
    }

    #[test]
    fn test_clean_reply() {
        assert_eq!(clean_reply("  **Dress**.\n"), Some("dress".to_string()));
        assert_eq!(clean_reply("\"jacket\""), Some("jacket".to_string()));
        assert_eq!(clean_reply("t-shirt"), Some("t-shirt".to_string()));
        assert_eq!(clean_reply("a dress"), None);
        assert_eq!(clean_reply("x"), None);
        assert_eq!(clean_reply(""), None);
        assert_eq!(clean_reply("shoes2"), None);
        assert_eq!(clean_reply("--"), None);
    }

    #[test]
    fn test_prompt_names_product() {
        let prompt = CategoryClassifier::build_prompt(&product("Clothing / Dresses"));
        assert!(prompt.contains("Product name: Floral Midi"));
        assert!(prompt.contains("Category: Clothing / Dresses"));
        assert!(prompt.contains("Brand: Acme"));
    }

    #[tokio::test]
    async fn test_model_reply_used() {
        let mock = Arc::new(MockBackend::fixed(MockReply::text("Dress")));
        let ctx = ctx_with(mock.clone());

        let term = CategoryClassifier::new().classify(&ctx, 0, &product("Clothing / Dresses")).await;

        assert_eq!(term.term, "dress");
        assert_eq!(term.source, CategorySource::Model);
        let requests = mock.requests();
        assert_eq!(requests[0].model, ctx.text_model);
        assert!(requests[0].images.is_empty());
        assert_eq!(requests[0].config, GenerationConfig::classification());
    }

    #[tokio::test]
    async fn test_service_error_falls_back() {
        let mock = Arc::new(MockBackend::fixed(MockReply::Status(500, "boom".into())));
        let ctx = ctx_with(mock);

        let term = CategoryClassifier::new().classify(&ctx, 0, &product("Clothing / Dresses")).await;

        assert_eq!(term.term, "dress");
        assert_eq!(term.source, CategorySource::Fallback);
    }

    #[tokio::test]
    async fn test_verbose_reply_falls_back() {
        let mock = Arc::new(MockBackend::fixed(MockReply::text("This is a lovely summer dress")));
        let ctx = ctx_with(mock);

        let term = CategoryClassifier::new().classify(&ctx, 0, &product("Outerwear / Coats")).await;

        assert_eq!(term.term, "coat");
        assert_eq!(term.source, CategorySource::Fallback);
    }

    #[tokio::test]
    async fn test_local_never_calls() {
        let mock = Arc::new(MockBackend::fixed(MockReply::text("hat")));
        let ctx = ctx_with(mock.clone());

        let term = CategoryClassifier::local().classify(&ctx, 0, &product("Shoes")).await;

        assert_eq!(term.term, "shoe");
        assert_eq!(mock.call_count(), 0);
    }
}
