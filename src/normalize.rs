//! Collapse job-board fields that arrive as a bare string, a nested object
//! or nothing at all into one optional display string.

use serde_json::Value;

const AREA_KEYS: &[&str] = &["name", "title", "id"];
const EXPERIENCE_KEYS: &[&str] = &["name", "title", "id"];
const EMPLOYMENT_KEYS: &[&str] = &["name", "title", "type", "id"];
const EMPLOYER_KEYS: &[&str] = &["name", "title", "firm_name", "id"];

pub fn normalize_area(value: &Value) -> Option<String> {
    normalize_field(value, AREA_KEYS)
}

pub fn normalize_experience(value: &Value) -> Option<String> {
    normalize_field(value, EXPERIENCE_KEYS)
}

pub fn normalize_employment(value: &Value) -> Option<String> {
    normalize_field(value, EMPLOYMENT_KEYS)
}

pub fn normalize_employer(value: &Value) -> Option<String> {
    normalize_field(value, EMPLOYER_KEYS)
}

/// Shared algorithm: falsy → None, string → trimmed, object → first truthy
/// candidate key, anything else → its rendering.
pub fn normalize_field(value: &Value, keys: &[&str]) -> Option<String> {
    if !is_truthy(value) {
        return None;
    }
    match value {
        Value::Object(map) => keys
            .iter()
            .filter_map(|k| map.get(*k))
            .filter(|v| is_truthy(v))
            .find_map(non_blank)
            .or_else(|| non_blank(value)),
        _ => non_blank(value),
    }
}

/// Lowercased, trimmed comparison key. Empty input stays empty.
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Python-style truthiness over JSON values.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Plain rendering: strings unquoted, everything else as compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn non_blank(value: &Value) -> Option<String> {
    let rendered = render(value);
    let trimmed = rendered.trim();
    if trimmed.is_empty() || (value.is_object() && trimmed == "{}") {
        None
    } else {
        Some(trimmed.to_string())
    }
}
