//! Locating JSON inside free-form model output.

/// Extract the JSON payload from a model reply.
///
/// Handles fenced blocks (```json ... ```) and otherwise takes the span from
/// the first `[` or `{` to the last `]` or `}`. Returns `None` when no such
/// span exists.
#[must_use]
pub fn extract_json(text: &str) -> Option<&str> {
    let body = fenced_body(text).unwrap_or(text);

    let start = body.find(['[', '{'])?;
    let end = body.rfind([']', '}'])?;
    if end < start {
        return None;
    }
    Some(body[start..=end].trim())
}

fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    // Skip an optional language tag on the fence line.
    let content_start = after.find('\n').map_or(0, |i| i + 1);
    let content = &after[content_start..];
    let close = content.find("```")?;
    Some(&content[..close])
}
