//! Refusal classification for text-only model replies.
//!
//! When a compositing step comes back without an image, the model usually
//! explains why in prose, or the service reports a block or finish reason.
//! [`parse_refusal`] turns that into a [`Refusal`] with a coarse
//! [`RefusalKind`] so callers can tell "try another photo" apart from
//! "this will never work".

use crate::output_parser::error::truncate;
use crate::output_parser::labeled::parse_labeled;
use serde::{Deserialize, Serialize};

/// Why the model declined to produce an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefusalKind {
    /// Content or safety policy.
    Policy,
    /// Editing a real person's likeness or identity.
    Identity,
    /// Input photo unusable (blurry, dark, subject not visible).
    Quality,
    /// A refusal with no recognisable cause.
    Unknown,
}

/// A classified refusal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Refusal {
    pub kind: RefusalKind,
    /// Short human-readable explanation.
    pub reason: String,
}

/// Service block/finish reasons that indicate a safety refusal.
const POLICY_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "RECITATION",
    "OTHER",
];

/// Service reasons about personally identifying content.
const IDENTITY_REASONS: &[&str] = &["SPII"];

const IDENTITY_TERMS: &[&str] = &[
    "identity",
    "likeness",
    "real person",
    "real people",
    "public figure",
    "celebrity",
    "facial features",
    "recognizable",
    "recognisable",
];

const POLICY_TERMS: &[&str] = &[
    "policy",
    "policies",
    "guidelines",
    "safety",
    "inappropriate",
    "explicit",
    "not allowed",
    "not permitted",
    "violate",
    "violates",
];

const QUALITY_TERMS: &[&str] = &[
    "blurry",
    "low quality",
    "low resolution",
    "too dark",
    "not visible",
    "obscured",
    "unclear",
    "cropped",
    "cannot see",
    "can't see",
];

/// Classify a reply that carried no image.
///
/// Service-reported reasons take precedence over the prose. Within the
/// prose, identity cues beat policy cues, which beat quality cues. A
/// `REASON:` line, when present, becomes the explanation; otherwise the
/// first sentence of the text is used.
///
/// Returns `None` only when there is neither text nor a service reason.
///
/// # Examples
///
/// ```
/// use tryon_pipeline::output_parser::{parse_refusal, RefusalKind};
///
/// let r = parse_refusal("I can't edit images of real people.", Some("STOP"), None).unwrap();
/// assert_eq!(r.kind, RefusalKind::Identity);
/// ```
pub fn parse_refusal(
    text: &str,
    finish_reason: Option<&str>,
    block_reason: Option<&str>,
) -> Option<Refusal> {
    let text = text.trim();

    // STOP and MAX_TOKENS are normal terminations, not a refusal signal.
    let service_reason = block_reason
        .map(|r| ("prompt blocked", r))
        .or_else(|| {
            finish_reason
                .filter(|r| !matches!(*r, "STOP" | "MAX_TOKENS" | "FINISH_REASON_UNSPECIFIED"))
                .map(|r| ("generation stopped", r))
        });

    if text.is_empty() && service_reason.is_none() {
        return None;
    }

    let reason = explanation(text)
        .or_else(|| service_reason.map(|(what, r)| format!("{}: {}", what, r)))
        .unwrap_or_default();

    let kind = match service_reason {
        Some((_, r)) if IDENTITY_REASONS.contains(&r) => RefusalKind::Identity,
        Some((_, r)) if POLICY_REASONS.contains(&r) => classify_text(text).unwrap_or(RefusalKind::Policy),
        _ => classify_text(text).unwrap_or(RefusalKind::Unknown),
    };

    Some(Refusal { kind, reason })
}

/// Identity is checked first so a policy refusal about real people lands there.
fn classify_text(text: &str) -> Option<RefusalKind> {
    let lower = text.to_lowercase();
    let has_any = |terms: &[&str]| terms.iter().any(|t| contains_term(&lower, t));

    if has_any(IDENTITY_TERMS) {
        Some(RefusalKind::Identity)
    } else if has_any(POLICY_TERMS) {
        Some(RefusalKind::Policy)
    } else if has_any(QUALITY_TERMS) {
        Some(RefusalKind::Quality)
    } else {
        None
    }
}

fn explanation(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    if let Ok(fields) = parse_labeled(text, &["REASON"]) {
        if let Some(reason) = fields.get("REASON") {
            return Some(truncate(reason, 200));
        }
    }
    let first = text
        .split_inclusive(['.', '!', '?', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(text);
    Some(truncate(first, 200))
}

/// Whether `needle` occurs in `haystack` on word boundaries.
fn contains_term(haystack: &str, needle: &str) -> bool {
    let h_bytes = haystack.as_bytes();
    let mut search_from = 0;

    while let Some(pos) = haystack[search_from..].find(needle) {
        let start = search_from + pos;
        let end = start + needle.len();

        let boundary_before = start == 0 || !h_bytes[start - 1].is_ascii_alphanumeric();
        let boundary_after = end >= haystack.len() || !h_bytes[end].is_ascii_alphanumeric();
        if boundary_before && boundary_after {
            return true;
        }

        search_from = start + needle.len().max(1);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_refusal() {
        let r = parse_refusal(
            "I'm sorry, I can't alter the likeness of a real person. Please try another photo.",
            Some("STOP"),
            None,
        )
        .unwrap();
        assert_eq!(r.kind, RefusalKind::Identity);
        assert_eq!(r.reason, "I'm sorry, I can't alter the likeness of a real person.");
    }

    #[test]
    fn policy_refusal_from_prose() {
        let r = parse_refusal("This request violates our content guidelines.", None, None).unwrap();
        assert_eq!(r.kind, RefusalKind::Policy);
    }

    #[test]
    fn quality_refusal() {
        let r = parse_refusal("The photo is too blurry to place the jacket.", None, None).unwrap();
        assert_eq!(r.kind, RefusalKind::Quality);
    }

    #[test]
    fn block_reason_without_text() {
        let r = parse_refusal("", None, Some("SAFETY")).unwrap();
        assert_eq!(r.kind, RefusalKind::Policy);
        assert_eq!(r.reason, "prompt blocked: SAFETY");
    }

    #[test]
    fn image_safety_finish_reason() {
        let r = parse_refusal("", Some("IMAGE_SAFETY"), None).unwrap();
        assert_eq!(r.kind, RefusalKind::Policy);
        assert_eq!(r.reason, "generation stopped: IMAGE_SAFETY");
    }

    #[test]
    fn spii_is_identity() {
        let r = parse_refusal("", None, Some("SPII")).unwrap();
        assert_eq!(r.kind, RefusalKind::Identity);
    }

    #[test]
    fn labeled_reason_preferred() {
        let r = parse_refusal("Cannot comply.\nREASON: subject is obscured", None, None).unwrap();
        assert_eq!(r.kind, RefusalKind::Quality);
        assert_eq!(r.reason, "subject is obscured");
    }

    #[test]
    fn unknown_when_no_cue() {
        let r = parse_refusal("Here is a description of the outfit.", Some("STOP"), None).unwrap();
        assert_eq!(r.kind, RefusalKind::Unknown);
    }

    #[test]
    fn nothing_to_classify() {
        assert!(parse_refusal("   ", Some("STOP"), None).is_none());
    }

    #[test]
    fn word_boundaries_respected() {
        assert!(contains_term("against policy.", "policy"));
        assert!(!contains_term("unsafetynet", "safety"));
        assert!(contains_term("a real person here", "real person"));
    }
}
