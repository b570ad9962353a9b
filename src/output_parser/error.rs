//! Error types for model output parsers.

/// Errors returned by output parsers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The model response was empty or whitespace-only.
    #[error("empty model response")]
    EmptyResponse,

    /// None of the expected `LABEL:` lines were present.
    #[error("no labeled field found (expected one of {expected:?}): {text}")]
    MissingLabels {
        /// The labels that were searched for.
        expected: Vec<String>,
        /// A truncated copy of the response (max 200 chars).
        text: String,
    },
}

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((end, _)) => format!("{}...", &s[..end]),
    }
}
