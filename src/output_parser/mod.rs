//! # Model Output Parser
//!
//! Small parsers for the free-form text the generative model returns.
//! They never call the model again.
//!
//! ## Parsers Available
//!
//! | Parser | Use Case |
//! |--------|----------|
//! | [`parse_labeled`] | Extract `LABEL: value` fields (photo scores, scene ideas) |
//! | [`parse_refusal`] | Classify a text-only compositing reply |

pub mod error;
pub mod labeled;
pub mod refusal;

pub use error::ParseError;
pub use labeled::{parse_labeled, LabeledFields};
pub use refusal::{parse_refusal, Refusal, RefusalKind};
