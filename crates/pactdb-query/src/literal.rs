//! SQL literal rendering.
//!
//! The compiler folds values into the generated SQL as literals rather than
//! bind parameters: full-text and JSONB expressions must match the planned
//! index expression exactly, and the same query shape is reused for every
//! value anyway. Everything user-supplied goes through this module.

use serde_json::Value;

/// Quote a string as a SQL literal.
///
/// Uses the `E''` form when the string contains backslashes so the rendering
/// does not depend on `standard_conforming_strings`.
pub fn string(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{escaped}'")
    }
}

/// Render a JSON value as a `jsonb` literal.
pub fn jsonb(value: &Value) -> String {
    let rendered = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    format!("{}::jsonb", string(&rendered))
}

/// Render a JSON number as a SQL numeric literal.
pub fn number(value: &serde_json::Number) -> String {
    value.to_string()
}

/// Render a list of path parts as a PostgreSQL `text[]` literal, for use
/// with the `#>` / `#>>` operators.
pub fn text_array(parts: &[String]) -> String {
    let inner: Vec<String> = parts
        .iter()
        .map(|p| format!("\"{}\"", p.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    string(&format!("{{{}}}", inner.join(",")))
}
