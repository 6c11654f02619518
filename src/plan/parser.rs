//! Extraction of a JSON document from model-generated text.
//!
//! Planner output often wraps JSON in reasoning blocks, markdown fences, or
//! prose. The candidate is chosen in order: the whole text when it is already
//! valid JSON, the first fenced block, the outermost `{...}` or `[...]`
//! (whichever opens first), then the text itself.

use std::sync::LazyLock;

use regex::Regex;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("think pattern is valid"));

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```(?:json)?\s*(.*?)```").expect("fence pattern is valid")
});

/// Removes `<think>...</think>` blocks and surrounding whitespace.
pub fn strip_think(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").trim().to_string()
}

/// Returns the most likely JSON payload inside `text`.
pub fn extract_json_candidate(text: &str) -> String {
    let text = strip_think(text);

    if serde_json::from_str::<serde_json::Value>(&text).is_ok() {
        return text;
    }

    if let Some(body) = CODE_FENCE
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|body| !body.is_empty())
    {
        return body.to_string();
    }

    let object = outermost(&text, '{', '}');
    let array = outermost(&text, '[', ']');
    let span = match (object, array) {
        (Some(o), Some(a)) => Some(if a.0 < o.0 { a.1 } else { o.1 }),
        (Some(o), None) => Some(o.1),
        (None, Some(a)) => Some(a.1),
        (None, None) => None,
    };

    span.map(str::to_string).unwrap_or(text)
}

/// Start offset and span from the first `open` to the last `close`, when
/// correctly ordered.
fn outermost(text: &str, open: char, close: char) -> Option<(usize, &str)> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| (start, text[start..=end].trim()))
}
