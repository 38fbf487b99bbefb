//! Full-text search emission.
//!
//! Three modes keyed by the column's static capability: plain text columns
//! feed `to_tsvector` directly, JSONB string fields go through
//! `jsonb_to_tsvector`, and text[] columns are flattened through the
//! `immutable_array_to_string` helper so the expression matches the planned
//! index. The search term is rendered as a literal for the same reason.

use crate::columns::SqlType;
use crate::literal;
use crate::path::Path;

const REGCONFIG: &str = "'english'";

/// Render a full-text predicate for `path` against rows of `table`.
pub fn render(path: &Path, term: &str, table: &str) -> String {
    let query = format!("plainto_tsquery({REGCONFIG}, {})", literal::string(term));
    let vector = match path.head_column().map(|s| s.sql_type) {
        Some(SqlType::Text) => {
            format!("to_tsvector({REGCONFIG}, {})", path.render(table))
        }
        Some(SqlType::TextArray) => format!(
            "to_tsvector({REGCONFIG}, immutable_array_to_string({}, ' '))",
            path.render(table)
        ),
        None if !path.is_json_context() => {
            // An unnested text[] element.
            format!("to_tsvector({REGCONFIG}, {})", path.render(table))
        }
        _ => format!(
            "jsonb_to_tsvector({REGCONFIG}, {}, '[\"string\"]')",
            path.render(table)
        ),
    };
    format!("{vector} @@ {query}")
}
