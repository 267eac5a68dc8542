//! Layered extraction of a JSON object from free-form LM output.
//!
//! Models decorate structured output in different ways depending on the
//! provider and prompt: `<r>…</r>` result tags, `<result>…</result>`,
//! fenced code blocks, or a bare object buried in prose.  The strategies
//! run in that fixed priority order; the first one that yields a valid
//! JSON *object* wins.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ParseError;

static R_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<r\s*>(.*?)</r\s*>").expect("valid regex"));

static RESULT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<result\s*>(.*?)</result\s*>").expect("valid regex"));

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)```").expect("valid regex"));

static REASONING_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<reasoning\s*>(.*?)</reasoning\s*>").expect("valid regex"));

/// Extracts the first JSON object from `text`.
///
/// Strategies, in priority order:
/// 1. `<r>…</r>`
/// 2. `<result>…</result>`
/// 3. fenced code block (```` ```json ```` or a bare fence)
/// 4. raw `{…}` object embedded in the text
pub fn parse_structured(text: &str) -> Result<Map<String, Value>, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    for (pattern, label) in [(&*R_TAG, "<r> tags"), (&*RESULT_TAG, "<result> tags")] {
        if let Some(caps) = pattern.captures(text) {
            if let Some(record) = try_parse_object(&caps[1]) {
                debug!(strategy = label, "structured record extracted");
                return Ok(record);
            }
        }
    }

    if let Some(caps) = CODE_FENCE.captures(text) {
        if let Some(record) = try_parse_object(&caps[1]) {
            debug!(strategy = "code fence", "structured record extracted");
            return Ok(record);
        }
    }

    if let Some(record) = extract_raw_object(text) {
        debug!(strategy = "raw object", "structured record extracted");
        return Ok(record);
    }

    Err(ParseError::NoJson {
        len: text.len(),
        prefix: text.chars().take(300).collect(),
    })
}

/// Reads the `<reasoning>…</reasoning>` block a model may emit before its
/// structured output.  `None` when absent.
pub fn extract_reasoning(text: &str) -> Option<String> {
    REASONING_TAG
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}

fn try_parse_object(text: &str) -> Option<Map<String, Value>> {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(cleaned) {
        Ok(Value::Object(record)) => Some(record),
        _ => None,
    }
}

/// Finds the first balanced JSON object in arbitrary text.
///
/// First tries the widest span (first `{` to last `}`), which covers the
/// common case of a single object surrounded by prose.  When that fails,
/// walks forward with a depth counter that respects string literals and
/// backslash escapes, returning the first balanced object that parses.
fn extract_raw_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    if let Some(record) = try_parse_object(&text[start..=end]) {
        return Some(record);
    }

    let mut depth: u32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return try_parse_object(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
