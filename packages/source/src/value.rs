use serde_json::Value as JsonValue;

/// Render a JSON value the way bindings print it.
///
/// Null is the empty string, strings are unquoted, arrays are comma-joined and
/// objects fall back to their JSON text.
pub fn display_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(","),
        JsonValue::Object(_) => value.to_string(),
    }
}

/// Null, the empty string, and arrays holding only such values count as "no value"
pub fn is_empty_value(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(items) => items.iter().all(is_empty_value),
        _ => false,
    }
}
