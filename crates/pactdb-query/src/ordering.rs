//! Sort, skip and limit emission.
//!
//! `sortBy: "version"` does not sort the rendered version string: it emits
//! five composite keys so releases order above prereleases (the empty
//! prerelease sorts first, always ascending) and the numeric components
//! compare numerically. `NULLS LAST` is applied to every key.

use pactdb_storage::types::WindowOptions;

use crate::columns;
use crate::error::{QueryBuilderError, Result};
use crate::path::{Path, PathSegment};

/// Render the `ORDER BY` key list for a window, or `None` when unsorted.
pub fn order_keys(window: &WindowOptions, table: &str) -> Result<Option<String>> {
    let Some(sort_by) = &window.sort_by else {
        return Ok(None);
    };
    if sort_by.is_empty() {
        return Ok(None);
    }
    let direction = window.sort_dir.as_sql();

    if sort_by.len() == 1 && sort_by[0] == columns::VERSION_PROPERTY {
        let keys = [
            format!("{table}.version_prerelease ASC NULLS LAST"),
            format!("{table}.version_major {direction} NULLS LAST"),
            format!("{table}.version_minor {direction} NULLS LAST"),
            format!("{table}.version_patch {direction} NULLS LAST"),
            format!("{table}.version_build {direction} NULLS LAST"),
        ];
        return Ok(Some(keys.join(", ")));
    }

    let head = &sort_by[0];
    let spec = columns::column(head).ok_or_else(|| {
        QueryBuilderError::invalid_schema("/sortBy", format!("unknown column '{head}'"))
    })?;
    if sort_by.len() > 1 && !spec.is_jsonb() {
        return Err(QueryBuilderError::invalid_schema(
            "/sortBy",
            format!("column '{head}' has no sub-properties to sort by"),
        ));
    }

    let mut path = Path::new();
    path.push(PathSegment::Column(head.clone()));
    for part in &sort_by[1..] {
        path.push(PathSegment::JsonProperty(part.clone()));
    }
    Ok(Some(format!(
        "{} {direction} NULLS LAST",
        path.render(table)
    )))
}

/// Render `LIMIT`/`OFFSET` for the outer window.
pub fn limit_offset(window: &WindowOptions) -> String {
    let mut clause = String::new();
    if let Some(limit) = window.limit {
        clause.push_str(&format!(" LIMIT {limit}"));
    }
    if window.skip > 0 {
        clause.push_str(&format!(" OFFSET {}", window.skip));
    }
    clause
}

/// The inner plan's limit: it must see `skip + limit` rows so the outer
/// window can still be cut, and uses no offset of its own.
pub fn inner_limit(window: &WindowOptions) -> Option<usize> {
    window.limit.map(|limit| limit + window.skip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pactdb_storage::types::SortDirection;

    fn window(sort_by: &[&str], dir: SortDirection) -> WindowOptions {
        WindowOptions {
            sort_by: Some(sort_by.iter().map(|s| s.to_string()).collect()),
            sort_dir: dir,
            ..Default::default()
        }
    }

    #[test]
    fn version_sort_emits_five_keys() {
        let keys = order_keys(&window(&["version"], SortDirection::Asc), "cards")
            .unwrap()
            .unwrap();
        assert_eq!(
            keys,
            "cards.version_prerelease ASC NULLS LAST, \
             cards.version_major ASC NULLS LAST, \
             cards.version_minor ASC NULLS LAST, \
             cards.version_patch ASC NULLS LAST, \
             cards.version_build ASC NULLS LAST"
        );
    }

    #[test]
    fn version_sort_desc_keeps_prerelease_ascending() {
        let keys = order_keys(&window(&["version"], SortDirection::Desc), "cards")
            .unwrap()
            .unwrap();
        assert!(keys.starts_with("cards.version_prerelease ASC NULLS LAST"));
        assert!(keys.contains("cards.version_major DESC NULLS LAST"));
    }

    #[test]
    fn column_sort_appends_nulls_last() {
        let keys = order_keys(&window(&["name"], SortDirection::Asc), "cards")
            .unwrap()
            .unwrap();
        assert_eq!(keys, "cards.name ASC NULLS LAST");
    }

    #[test]
    fn jsonb_sort_descends() {
        let keys = order_keys(&window(&["data", "count"], SortDirection::Desc), "cards")
            .unwrap()
            .unwrap();
        assert_eq!(keys, "cards.data#>'{\"count\"}' DESC NULLS LAST");
    }

    #[test]
    fn unknown_sort_column_is_rejected() {
        assert!(order_keys(&window(&["bogus"], SortDirection::Asc), "cards").is_err());
    }

    #[test]
    fn sub_sort_on_scalar_column_is_rejected() {
        assert!(order_keys(&window(&["slug", "x"], SortDirection::Asc), "cards").is_err());
    }

    #[test]
    fn inner_limit_covers_outer_window() {
        let w = WindowOptions {
            skip: 10,
            limit: Some(5),
            ..Default::default()
        };
        assert_eq!(inner_limit(&w), Some(15));
        assert_eq!(limit_offset(&w), " LIMIT 5 OFFSET 10");
    }
}
