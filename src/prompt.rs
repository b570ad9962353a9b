/// Build a prompt string with variable substitution.
///
/// Replaces `{key}` placeholders in the template with the matching value
/// from `vars`. Unknown placeholders are left as they are. Substituted
/// values are never rescanned, so a product name containing `{x}` is
/// inserted verbatim.
///
/// Use `{{` to insert a literal `{` and `}}` to insert a literal `}`.
///
/// # Example
///
/// ```
/// use tryon_pipeline::prompt::render;
///
/// let result = render("Add the {category}, format: {{\"ok\": true}}", &[("category", "dress")]);
/// assert_eq!(result, r#"Add the dress, format: {"ok": true}"#);
/// ```
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("{{") {
            out.push('{');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("}}") {
            out.push('}');
            rest = after;
        } else if let Some(close) = tail.strip_prefix('{').and_then(|t| t.find('}')) {
            let key = &tail[1..=close];
            match vars.iter().find(|(k, _)| *k == key) {
                Some((_, value)) => out.push_str(value),
                None => out.push_str(&tail[..close + 2]),
            }
            rest = &tail[close + 2..];
        } else {
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

/// Create a numbered list from items (1-indexed).
pub fn numbered_list(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}
