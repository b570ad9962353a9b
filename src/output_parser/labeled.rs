//! `LABEL: value` extraction from free-form model text.
//!
//! Models asked for a fixed set of labeled fields rarely answer in exactly
//! that shape. [`parse_labeled`] tolerates the usual decorations:
//!
//! - Bold labels: `**SCORE:** 85`, `**SCORE**: 85`
//! - Numbered or bulleted lines: `1. LOCATION: beach`, `- MOOD: calm`
//! - Markdown headings: `## ANALYSIS: ...`
//! - Any letter case: `Location: beach`
//! - Values that run over several lines, up to the next recognised label

use crate::output_parser::error::{truncate, ParseError};

/// Fields extracted by [`parse_labeled`], in the order they appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabeledFields {
    fields: Vec<(String, String)>,
}

impl LabeledFields {
    /// Value for `label` (case-insensitive). Blank values read as `None`.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(l, _)| l.eq_ignore_ascii_case(label))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// First integer in the value for `label`, e.g. `85` from `"85/100"`.
    pub fn integer(&self, label: &str) -> Option<i64> {
        let value = self.get(label)?;
        let start = value.find(|c: char| c.is_ascii_digit())?;
        let digits: String = value[start..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        let negative = value[..start].ends_with('-');
        let n = digits.parse::<i64>().ok()?;
        Some(if negative { -n } else { n })
    }

    /// Number of labels found.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Extract `LABEL: value` fields for the given labels.
///
/// A value starts after the label's colon and continues over following
/// lines until the next recognised label. The first occurrence of a label
/// wins; repeats are ignored along with their continuation lines. Text
/// before the first label is discarded.
///
/// Fails with [`ParseError::EmptyResponse`] on blank input and
/// [`ParseError::MissingLabels`] when no label is found at all.
///
/// # Examples
///
/// ```
/// use tryon_pipeline::output_parser::parse_labeled;
///
/// let fields = parse_labeled("**SCORE:** 85\nANALYSIS: well lit", &["SCORE", "ANALYSIS"]).unwrap();
/// assert_eq!(fields.integer("score"), Some(85));
/// assert_eq!(fields.get("analysis"), Some("well lit"));
/// ```
pub fn parse_labeled(response: &str, labels: &[&str]) -> Result<LabeledFields, ParseError> {
    if response.trim().is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    let mut fields: Vec<(String, String)> = Vec::new();
    // Index into `fields` of the value currently being extended.
    let mut current: Option<usize> = None;

    for line in response.lines() {
        if let Some((label, value)) = match_label(line, labels) {
            if fields.iter().any(|(l, _)| l.eq_ignore_ascii_case(label)) {
                current = None;
                continue;
            }
            fields.push((label.to_string(), value.to_string()));
            current = Some(fields.len() - 1);
        } else if let Some(idx) = current {
            let value = &mut fields[idx].1;
            value.push('\n');
            value.push_str(line.trim_end());
        }
    }

    if fields.is_empty() {
        return Err(ParseError::MissingLabels {
            expected: labels.iter().map(|l| l.to_string()).collect(),
            text: truncate(response.trim(), 200),
        });
    }

    for (_, value) in fields.iter_mut() {
        *value = clean_value(value);
    }

    Ok(LabeledFields { fields })
}

/// If `line` opens a recognised label, return the label and the rest of the line.
fn match_label<'a, 'l>(line: &'a str, labels: &[&'l str]) -> Option<(&'l str, &'a str)> {
    let body = strip_decoration(line);
    for &label in labels {
        let Some(head) = body.get(..label.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(label) {
            continue;
        }
        let rest = body[label.len()..].trim_start_matches(|c: char| c == '*' || c == ' ');
        if let Some(value) = rest.strip_prefix(':') {
            return Some((label, value));
        }
    }
    None
}

/// Strip list numbering, bullets, heading marks and bold markers from the line start.
fn strip_decoration(line: &str) -> &str {
    let is_mark = |c: char| matches!(c, '#' | '-' | '*' | '>' | '•') || c.is_whitespace();
    let mut s = line.trim_start_matches(is_mark);

    let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let after = &s[digits..];
        if let Some(rest) = after.strip_prefix('.').or_else(|| after.strip_prefix(')')) {
            s = rest.trim_start_matches(is_mark);
        }
    }
    s
}

fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_matches('*')
        .trim()
        .to_string()
}
