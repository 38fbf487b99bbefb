//! The path model.
//!
//! A [`Path`] tracks the logical location a filter talks about while the
//! builder walks a schema: a head column, optionally a sub-column (an
//! unnested array element), and a JSONB descent below either. Rendering
//! produces the SQL expression for the value, choosing between the
//! JSONB-returning and text-returning extraction operators depending on what
//! the requesting filter needs; the cast choice is driven by the filter, not
//! by the path.

use crate::columns::{self, ColumnSpec, SqlType};
use crate::literal;

/// One segment of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A column of the primary table. Only valid at the head.
    Column(String),
    /// An unnested array element, addressed through a generated alias.
    /// `json` distinguishes `jsonb_array_elements` output (a `value`
    /// column) from `unnest` output (a bare alias).
    SubColumn { alias: String, json: bool },
    /// A property inside a JSONB value.
    JsonProperty(String),
    /// An index inside a JSONB array, or into a SQL array column.
    JsonIndex(usize),
}

/// The addressable location a filter references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path {
    segments: Vec<PathSegment>,
}

impl Path {
    /// The empty path: processing the table itself.
    pub fn new() -> Self {
        Self::default()
    }

    /// A path rooted at an unnested array element.
    pub fn element(alias: impl Into<String>, json: bool) -> Self {
        Self {
            segments: vec![PathSegment::SubColumn {
                alias: alias.into(),
                json,
            }],
        }
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    pub fn pop(&mut self) -> Option<PathSegment> {
        self.segments.pop()
    }

    pub fn set_last(&mut self, segment: PathSegment) {
        if let Some(last) = self.segments.last_mut() {
            *last = segment;
        }
    }

    pub fn get_last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    pub fn get_second_to_last(&self) -> Option<&PathSegment> {
        self.segments.len().checked_sub(2).map(|i| &self.segments[i])
    }

    pub fn is_processing_table(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_processing_column(&self) -> bool {
        self.segments.len() == 1 && matches!(self.segments[0], PathSegment::Column(_))
    }

    pub fn is_processing_sub_column(&self) -> bool {
        self.segments.len() == 1 && matches!(self.segments[0], PathSegment::SubColumn { .. })
    }

    pub fn is_processing_json_property(&self) -> bool {
        self.segments.len() > 1
    }

    /// The capability record of the head column, when the path starts at one.
    pub fn head_column(&self) -> Option<&'static ColumnSpec> {
        match self.segments.first() {
            Some(PathSegment::Column(name)) => columns::column(name),
            _ => None,
        }
    }

    /// The statically-known JSON type of the addressed value, when the path
    /// stays on native columns. JSONB descents are dynamically typed and
    /// return `None`.
    pub fn static_json_type(&self) -> Option<crate::columns::JsonType> {
        match self.segments.first() {
            Some(PathSegment::Column(name)) => {
                let spec = columns::column(name)?;
                if self.segments.len() == 1 {
                    return Some(spec.json_type);
                }
                match spec.sql_type {
                    SqlType::TextArray
                        if self.segments.len() == 2
                            && matches!(self.segments[1], PathSegment::JsonIndex(_)) =>
                    {
                        spec.array_item
                    }
                    _ => None,
                }
            }
            Some(PathSegment::SubColumn { json, .. }) if self.segments.len() == 1 => {
                if *json {
                    None
                } else {
                    Some(crate::columns::JsonType::String)
                }
            }
            _ => None,
        }
    }

    /// Whether the addressed value is JSONB (as opposed to a native SQL
    /// scalar or a text[] element).
    pub fn is_json_context(&self) -> bool {
        match self.segments.first() {
            Some(PathSegment::Column(name)) => {
                let Some(spec) = columns::column(name) else {
                    return false;
                };
                match spec.sql_type {
                    SqlType::Jsonb => true,
                    SqlType::JsonbArray => self.segments.len() > 1,
                    // text[] elements and deeper are never JSONB
                    _ => false,
                }
            }
            Some(PathSegment::SubColumn { json, .. }) => *json,
            _ => false,
        }
    }

    /// Render the JSONB-returning (or native) expression for this path.
    pub fn render(&self, table: &str) -> String {
        self.render_with(table, false)
    }

    /// Render the text-returning variant, for comparisons that want text or
    /// a numeric/temporal cast on top.
    pub fn render_text(&self, table: &str) -> String {
        self.render_with(table, true)
    }

    fn render_with(&self, table: &str, as_text: bool) -> String {
        let (base, base_is_jsonb, descent_start) = match self.segments.first() {
            None => return table.to_string(),
            Some(PathSegment::Column(name)) => {
                let spec = columns::column(name);
                let sql_type = spec.map(|s| s.sql_type);
                match sql_type {
                    // Array columns with an index use 1-based SQL indexing.
                    Some(SqlType::TextArray | SqlType::JsonbArray)
                        if matches!(self.segments.get(1), Some(PathSegment::JsonIndex(_))) =>
                    {
                        let Some(PathSegment::JsonIndex(i)) = self.segments.get(1) else {
                            unreachable!()
                        };
                        let jsonb = sql_type == Some(SqlType::JsonbArray);
                        (format!("{table}.{name}[{}]", i + 1), jsonb, 2)
                    }
                    Some(SqlType::Jsonb) => (format!("{table}.{name}"), true, 1),
                    _ => (format!("{table}.{name}"), false, 1),
                }
            }
            Some(PathSegment::SubColumn { alias, json }) => {
                let base = if *json {
                    format!("{alias}.value")
                } else {
                    alias.clone()
                };
                (base, *json, 1)
            }
            Some(_) => (table.to_string(), false, 0),
        };

        let descent: Vec<String> = self.segments[descent_start.min(self.segments.len())..]
            .iter()
            .map(|segment| match segment {
                PathSegment::JsonProperty(name) => name.clone(),
                PathSegment::JsonIndex(i) => i.to_string(),
                other => panic!("segment {other:?} is not valid below the head"),
            })
            .collect();

        if descent.is_empty() {
            if as_text {
                if base_is_jsonb {
                    // Extract the whole value as text, unquoting strings.
                    format!("{base}#>>'{{}}'")
                } else if self.native_text_cast_needed() {
                    format!("{base}::text")
                } else {
                    base
                }
            } else {
                base
            }
        } else {
            let operator = if as_text { "#>>" } else { "#>" };
            let needs_parens = base.ends_with(']');
            let base = if needs_parens { format!("({base})") } else { base };
            format!("{base}{operator}{}", literal::text_array(&descent))
        }
    }

    fn native_text_cast_needed(&self) -> bool {
        match self.head_column() {
            Some(spec) => !matches!(spec.sql_type, SqlType::Text),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_path(parts: &[&str]) -> Path {
        let mut path = Path::new();
        path.push(PathSegment::Column(parts[0].to_string()));
        for part in &parts[1..] {
            path.push(PathSegment::JsonProperty((*part).to_string()));
        }
        path
    }

    #[test]
    fn renders_plain_column() {
        assert_eq!(column_path(&["slug"]).render("cards"), "cards.slug");
    }

    #[test]
    fn renders_jsonb_descent() {
        let path = column_path(&["data", "status", "value"]);
        assert_eq!(path.render("cards"), "cards.data#>'{\"status\",\"value\"}'");
        assert_eq!(
            path.render_text("cards"),
            "cards.data#>>'{\"status\",\"value\"}'"
        );
    }

    #[test]
    fn renders_array_index_one_based() {
        let mut path = Path::new();
        path.push(PathSegment::Column("tags".to_string()));
        path.push(PathSegment::JsonIndex(0));
        assert_eq!(path.render("cards"), "cards.tags[1]");
    }

    #[test]
    fn renders_jsonb_array_index_zero_based() {
        let mut path = Path::new();
        path.push(PathSegment::Column("data".to_string()));
        path.push(PathSegment::JsonProperty("mirrors".to_string()));
        path.push(PathSegment::JsonIndex(2));
        assert_eq!(path.render("cards"), "cards.data#>'{\"mirrors\",\"2\"}'");
    }

    #[test]
    fn renders_sub_column_variants() {
        let json_elem = Path::element("contains0", true);
        assert_eq!(json_elem.render("cards"), "contains0.value");
        assert_eq!(json_elem.render_text("cards"), "contains0.value#>>'{}'");

        let text_elem = Path::element("contains1", false);
        assert_eq!(text_elem.render("cards"), "contains1");
        assert_eq!(text_elem.render_text("cards"), "contains1");
    }

    #[test]
    fn renders_at_override_table_alias() {
        assert_eq!(column_path(&["name"]).render("linked0"), "linked0.name");
    }

    #[test]
    fn non_text_native_columns_cast_for_text() {
        assert_eq!(column_path(&["id"]).render_text("cards"), "cards.id::text");
        assert_eq!(column_path(&["slug"]).render_text("cards"), "cards.slug");
    }

    #[test]
    fn json_context_detection() {
        assert!(column_path(&["data"]).is_json_context());
        assert!(column_path(&["data", "x"]).is_json_context());
        assert!(!column_path(&["slug"]).is_json_context());
        assert!(!column_path(&["tags"]).is_json_context());

        let mut requires_elem = Path::new();
        requires_elem.push(PathSegment::Column("requires".to_string()));
        requires_elem.push(PathSegment::JsonIndex(0));
        assert!(requires_elem.is_json_context());
    }

    #[test]
    fn tracks_processing_state() {
        let mut path = Path::new();
        assert!(path.is_processing_table());
        path.push(PathSegment::Column("data".to_string()));
        assert!(path.is_processing_column());
        path.push(PathSegment::JsonProperty("a".to_string()));
        assert!(path.is_processing_json_property());
        assert_eq!(
            path.get_second_to_last(),
            Some(&PathSegment::Column("data".to_string()))
        );
        path.pop();
        assert!(path.is_processing_column());
    }
}
