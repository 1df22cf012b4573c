//! Response normalizer: pull a readable reply out of whatever an agent sent back
//!
//! Agents answer in many shapes: JSON-RPC result trees, OpenAI-style `choices`,
//! Gemini `candidates`, bare strings, or arbitrary object graphs. Extraction runs
//! an ordered chain of small strategies and the first non-empty answer wins.
//! Unknown shapes yield an empty string; callers substitute their own fallback.

use serde_json::Value;
use tracing::trace;

/// Dotted paths tried in order by [`from_known_paths`]
pub const TEXT_PATHS: &[&str] = &[
    "result.message.content",
    "result.message.text",
    "result.output",
    "result.text",
    "result.content",
    "message.content",
    "message.text",
    "output",
    "response",
    "answer",
    "content",
    "text",
];

/// Locations of `parts` arrays tried in order by [`from_parts`]
pub const PARTS_PATHS: &[&str] = &[
    "result.message.parts",
    "result.status.message.parts",
    "result.artifacts.0.parts",
    "message.parts",
    "candidates.0.content.parts",
    "parts",
];

/// Chat-completion style locations tried by [`from_choices`]
pub const CHOICE_PATHS: &[&str] = &["choices.0.message.content", "choices.0.text"];

/// Keys that mark a text payload anywhere in the graph
pub const DEEP_SEARCH_KEYS: &[&str] = &["text", "content", "output", "answer"];

const MAX_SEARCH_DEPTH: usize = 32;

/// One step of the extraction chain
#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    pub name: &'static str,
    pub extract: fn(&Value) -> Option<String>,
}

/// The extraction chain, in priority order
pub const STRATEGIES: &[Strategy] = &[
    Strategy { name: "plain_string", extract: from_plain_string },
    Strategy { name: "known_paths", extract: from_known_paths },
    Strategy { name: "parts", extract: from_parts },
    Strategy { name: "choices", extract: from_choices },
    Strategy { name: "deep_search", extract: from_deep_search },
];

/// Most plausible human-readable text in `value`, or `""`
pub fn extract_text(value: &Value) -> String {
    for strategy in STRATEGIES {
        if let Some(text) = (strategy.extract)(value) {
            trace!("Extracted {} chars via {}", text.len(), strategy.name);
            return text;
        }
    }
    String::new()
}

/// Like [`extract_text`] but substitutes `fallback` when nothing matched
pub fn extract_text_or(value: &Value, fallback: &str) -> String {
    let text = extract_text(value);
    if text.is_empty() { fallback.to_string() } else { text }
}

/// Resolve a dotted path. Numeric segments index into arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Non-empty string at `path`
pub fn try_path(value: &Value, path: &str) -> Option<String> {
    lookup(value, path).and_then(non_empty_str).map(str::to_string)
}

pub fn from_plain_string(value: &Value) -> Option<String> {
    non_empty_str(value).map(str::to_string)
}

pub fn from_known_paths(value: &Value) -> Option<String> {
    TEXT_PATHS.iter().find_map(|path| try_path(value, path))
}

/// Join the text of the first `parts` array found, one part per line
pub fn from_parts(value: &Value) -> Option<String> {
    let parts = PARTS_PATHS
        .iter()
        .find_map(|path| lookup(value, path).and_then(Value::as_array))?;

    let joined = parts
        .iter()
        .filter_map(|part| match part {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map.get("text").and_then(Value::as_str),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    if joined.trim().is_empty() { None } else { Some(joined) }
}

pub fn from_choices(value: &Value) -> Option<String> {
    CHOICE_PATHS.iter().find_map(|path| try_path(value, path))
}

/// Depth-first walk; first non-empty string under a [`DEEP_SEARCH_KEYS`] key
pub fn from_deep_search(value: &Value) -> Option<String> {
    deep_search(value, 0)
}

fn deep_search(value: &Value, depth: usize) -> Option<String> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => map.iter().find_map(|(key, child)| {
            if DEEP_SEARCH_KEYS.contains(&key.as_str()) {
                if let Some(text) = non_empty_str(child) {
                    return Some(text.to_string());
                }
            }
            deep_search(child, depth + 1)
        }),
        Value::Array(items) => items.iter().find_map(|item| deep_search(item, depth + 1)),
        _ => None,
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.trim().is_empty())
}
