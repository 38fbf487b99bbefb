//! The filter algebra.
//!
//! Filters form a tagged tree: primitive predicates referencing a [`Path`]
//! plus the boolean connectives. The algebra performs trivial simplification
//! (absorbing constants, folding double negation) but makes no attempt at
//! normal forms; query planning cost is the database's job.

use serde_json::Value;

use crate::columns::{JsonType, SqlType};
use crate::fts;
use crate::literal;
use crate::path::Path;

/// Comparison operators usable in [`Filter::ValueIs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// JSONB containment (`@>`).
    Contains,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Contains => "@>",
        }
    }
}

/// Cast applied to both sides of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCast {
    Numeric,
    Date,
    Time,
    Timestamp,
}

impl ValueCast {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Date => "date",
            Self::Time => "time",
            Self::Timestamp => "timestamptz",
        }
    }
}

/// A node of the filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Constant truth value; `Constant(false)` is the unsatisfiable filter.
    Constant(bool),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),

    /// Membership in an enumerated value set (`=` / `IN`).
    Equals { path: Path, values: Vec<Value> },
    /// A single comparison, optionally under a cast.
    ValueIs {
        path: Path,
        op: CompareOp,
        value: Value,
        cast: Option<ValueCast>,
    },
    /// POSIX regex match; `ignore_case` selects `~*`.
    MatchesRegex {
        path: Path,
        pattern: String,
        ignore_case: bool,
    },
    IsNull {
        path: Path,
        negate: bool,
    },
    /// `jsonb_typeof` membership.
    IsOfJsonTypes {
        path: Path,
        types: Vec<JsonType>,
    },
    ArrayLength {
        path: Path,
        op: CompareOp,
        length: usize,
    },
    /// An element of the array satisfies the child filter. The child's
    /// paths are rooted at `alias`.
    ArrayContains {
        path: Path,
        alias: String,
        element: Box<Filter>,
    },
    StringLength {
        path: Path,
        op: CompareOp,
        length: usize,
    },
    JsonMapPropertyCount {
        path: Path,
        op: CompareOp,
        count: usize,
    },
    MultipleOf {
        path: Path,
        multiple: serde_json::Number,
    },
    FullTextSearch {
        path: Path,
        term: String,
    },
    /// A `$$links` constraint: the joined contract exists and satisfies the
    /// sub-filter. Resolved to joins by the query builder.
    Link {
        name: String,
        join_alias: String,
        sub: Box<Filter>,
    },
}

impl Filter {
    /// Conjoin a list of filters, absorbing constants.
    pub fn conjoin(filters: Vec<Filter>) -> Filter {
        let mut flat = Vec::new();
        for filter in filters {
            match filter {
                Filter::Constant(true) => {}
                Filter::Constant(false) => return Filter::Constant(false),
                Filter::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Filter::Constant(true),
            1 => flat.into_iter().next().expect("len checked"),
            _ => Filter::And(flat),
        }
    }

    /// Disjoin a list of filters, absorbing constants.
    pub fn disjoin(filters: Vec<Filter>) -> Filter {
        let mut flat = Vec::new();
        for filter in filters {
            match filter {
                Filter::Constant(false) => {}
                Filter::Constant(true) => return Filter::Constant(true),
                Filter::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Filter::Constant(false),
            1 => flat.into_iter().next().expect("len checked"),
            _ => Filter::Or(flat),
        }
    }

    pub fn and_with(self, other: Filter) -> Filter {
        Filter::conjoin(vec![self, other])
    }

    pub fn or_with(self, other: Filter) -> Filter {
        Filter::disjoin(vec![self, other])
    }

    /// Negate, folding constants and double negation.
    pub fn negate(self) -> Filter {
        match self {
            Filter::Constant(value) => Filter::Constant(!value),
            Filter::Not(inner) => *inner,
            Filter::IsNull { path, negate } => Filter::IsNull {
                path,
                negate: !negate,
            },
            other => Filter::Not(Box::new(other)),
        }
    }

    /// Material implication: `self → other` as `¬self ∨ other`.
    pub fn implies(self, other: Filter) -> Filter {
        self.negate().or_with(other)
    }

    /// Collapse this filter to constant false.
    pub fn make_unsatisfiable(&mut self) {
        *self = Filter::Constant(false);
    }

    /// A copy of this filter with link constraints erased. Branch guards in
    /// the projection are re-rendered outside the plan that owns the link
    /// joins, where the join aliases do not exist.
    pub fn without_links(&self) -> Filter {
        match self {
            Filter::Link { .. } => Filter::Constant(true),
            Filter::And(parts) => {
                Filter::conjoin(parts.iter().map(Self::without_links).collect())
            }
            Filter::Or(parts) => {
                Filter::disjoin(parts.iter().map(Self::without_links).collect())
            }
            Filter::Not(inner) => inner.without_links().negate(),
            other => other.clone(),
        }
    }

    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self, Filter::Constant(false))
    }

    /// Render this filter as a SQL boolean expression against rows of
    /// `table` (the current row alias).
    pub fn to_sql(&self, table: &str) -> String {
        match self {
            Filter::Constant(true) => "true".to_string(),
            Filter::Constant(false) => "false".to_string(),
            Filter::And(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_sql(table)).collect();
                format!("({})", rendered.join(" AND "))
            }
            Filter::Or(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_sql(table)).collect();
                format!("({})", rendered.join(" OR "))
            }
            Filter::Not(inner) => format!("NOT {}", inner.to_sql(table)),
            Filter::Equals { path, values } => render_equals(path, values, table),
            Filter::ValueIs {
                path,
                op,
                value,
                cast,
            } => render_value_is(path, *op, value, *cast, table),
            Filter::MatchesRegex {
                path,
                pattern,
                ignore_case,
            } => {
                let operator = if *ignore_case { "~*" } else { "~" };
                format!(
                    "{} {operator} {}",
                    path.render_text(table),
                    literal::string(pattern)
                )
            }
            Filter::IsNull { path, negate } => {
                let check = if *negate { "IS NOT NULL" } else { "IS NULL" };
                format!("{} {check}", path.render(table))
            }
            Filter::IsOfJsonTypes { path, types } => render_json_types(path, types, table),
            Filter::ArrayLength { path, op, length } => {
                let lhs = if path.is_json_context() {
                    format!("jsonb_array_length({})", path.render(table))
                } else {
                    format!("coalesce(array_length({}, 1), 0)", path.render(table))
                };
                format!("{lhs} {} {length}", op.as_sql())
            }
            Filter::ArrayContains {
                path,
                alias,
                element,
            } => render_array_contains(path, alias, element, table),
            Filter::StringLength { path, op, length } => format!(
                "char_length({}) {} {length}",
                path.render_text(table),
                op.as_sql()
            ),
            Filter::JsonMapPropertyCount { path, op, count } => format!(
                "(SELECT count(*) FROM jsonb_object_keys({})) {} {count}",
                path.render(table),
                op.as_sql()
            ),
            Filter::MultipleOf { path, multiple } => {
                let lhs = if path.is_json_context() {
                    format!("({})::numeric", path.render_text(table))
                } else {
                    format!("{}::numeric", path.render(table))
                };
                format!("({lhs} % {}) = 0", literal::number(multiple))
            }
            Filter::FullTextSearch { path, term } => fts::render(path, term, table),
            Filter::Link {
                join_alias, sub, ..
            } => {
                format!(
                    "({join_alias}.id IS NOT NULL AND {})",
                    sub.to_sql(join_alias)
                )
            }
        }
    }
}

fn render_equals(path: &Path, values: &[Value], table: &str) -> String {
    if values.is_empty() {
        return "false".to_string();
    }
    if path.is_json_context() {
        let lhs = path.render(table);
        let rendered: Vec<String> = values.iter().map(literal::jsonb).collect();
        return in_list(&lhs, &rendered);
    }

    let spec = path.head_column();
    let lhs = path.render(table);
    let rendered: Vec<String> = values
        .iter()
        .filter_map(|value| render_native_value(spec.map(|s| s.sql_type), value))
        .collect();
    if rendered.is_empty() {
        // None of the enumerated values can inhabit this column.
        return "false".to_string();
    }
    in_list(&lhs, &rendered)
}

fn in_list(lhs: &str, rendered: &[String]) -> String {
    if rendered.len() == 1 {
        format!("{lhs} = {}", rendered[0])
    } else {
        format!("{lhs} IN ({})", rendered.join(", "))
    }
}

/// Render a JSON value as a literal comparable to a native column.
/// Returns `None` when the value's type cannot inhabit the column.
fn render_native_value(sql_type: Option<SqlType>, value: &Value) -> Option<String> {
    match sql_type {
        Some(SqlType::Text | SqlType::Uuid) => {
            value.as_str().map(literal::string)
        }
        Some(SqlType::Timestamp) => value
            .as_str()
            .map(|s| format!("{}::timestamptz", literal::string(s))),
        Some(SqlType::Integer) => match value {
            Value::Number(n) => Some(literal::number(n)),
            _ => None,
        },
        Some(SqlType::Boolean) => value.as_bool().map(|b| b.to_string()),
        Some(SqlType::TextArray) => {
            let items = value.as_array()?;
            let rendered: Vec<String> = items
                .iter()
                .map(|item| item.as_str().map(literal::string))
                .collect::<Option<_>>()?;
            Some(format!("ARRAY[{}]::text[]", rendered.join(", ")))
        }
        // Text[] elements reached through a sub-column alias.
        None => value.as_str().map(literal::string),
        _ => None,
    }
}

fn render_value_is(
    path: &Path,
    op: CompareOp,
    value: &Value,
    cast: Option<ValueCast>,
    table: &str,
) -> String {
    if op == CompareOp::Contains {
        return format!("{} @> {}", path.render(table), literal::jsonb(value));
    }

    match cast {
        Some(cast) => {
            let lhs = if path.is_json_context() {
                format!("({})::{}", path.render_text(table), cast.as_sql())
            } else if native_cast_redundant(path, cast) {
                path.render(table)
            } else {
                format!("({})::{}", path.render_text(table), cast.as_sql())
            };
            let rhs = match value {
                Value::Number(n) => literal::number(n),
                Value::String(s) => format!("{}::{}", literal::string(s), cast.as_sql()),
                other => literal::jsonb(other),
            };
            format!("{lhs} {} {rhs}", op.as_sql())
        }
        None => {
            if path.is_json_context() {
                format!(
                    "{} {} {}",
                    path.render(table),
                    op.as_sql(),
                    literal::jsonb(value)
                )
            } else {
                let rendered =
                    render_native_value(path.head_column().map(|s| s.sql_type), value)
                        .unwrap_or_else(|| "null".to_string());
                format!("{} {} {rendered}", path.render(table), op.as_sql())
            }
        }
    }
}

/// A timestamp column compared under a timestamp cast needs no cast of its
/// own; everything else gets one.
fn native_cast_redundant(path: &Path, cast: ValueCast) -> bool {
    matches!(
        (path.head_column().map(|s| s.sql_type), cast),
        (Some(SqlType::Timestamp), ValueCast::Timestamp)
            | (Some(SqlType::Integer), ValueCast::Numeric)
    )
}

fn render_json_types(path: &Path, types: &[JsonType], table: &str) -> String {
    if types.is_empty() {
        return "false".to_string();
    }
    let lhs = format!("jsonb_typeof({})", path.render(table));
    let rendered: Vec<String> = types
        .iter()
        .map(|t| literal::string(t.as_str()))
        .collect();
    // A missing value extracts to SQL NULL; the coalesce keeps the guard
    // two-valued so its negation stays usable under implications.
    format!("coalesce({}, false)", in_list(&lhs, &rendered))
}

fn render_array_contains(path: &Path, alias: &str, element: &Filter, table: &str) -> String {
    let source = match path.head_column().map(|s| s.sql_type) {
        Some(SqlType::TextArray) if !path.is_processing_json_property() => {
            format!("unnest({}) AS {alias}", path.render(table))
        }
        Some(SqlType::JsonbArray) if !path.is_processing_json_property() => {
            format!("unnest({}) AS {alias}(value)", path.render(table))
        }
        _ => format!("jsonb_array_elements({}) AS {alias}", path.render(table)),
    };
    format!(
        "EXISTS (SELECT 1 FROM {source} WHERE {})",
        element.to_sql(table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathSegment;
    use serde_json::json;

    fn data_path(parts: &[&str]) -> Path {
        let mut path = Path::new();
        path.push(PathSegment::Column("data".to_string()));
        for part in parts {
            path.push(PathSegment::JsonProperty((*part).to_string()));
        }
        path
    }

    fn column_path(name: &str) -> Path {
        let mut path = Path::new();
        path.push(PathSegment::Column(name.to_string()));
        path
    }

    #[test]
    fn conjoin_absorbs_constants() {
        let filter = Filter::conjoin(vec![
            Filter::Constant(true),
            Filter::IsNull {
                path: column_path("name"),
                negate: false,
            },
        ]);
        assert!(matches!(filter, Filter::IsNull { .. }));

        let filter = Filter::conjoin(vec![
            Filter::Constant(false),
            Filter::Constant(true),
        ]);
        assert!(filter.is_unsatisfiable());
    }

    #[test]
    fn disjoin_short_circuits_on_true() {
        let filter = Filter::disjoin(vec![
            Filter::Constant(true),
            Filter::Constant(false),
        ]);
        assert_eq!(filter, Filter::Constant(true));
    }

    #[test]
    fn double_negation_folds() {
        let inner = Filter::Equals {
            path: column_path("slug"),
            values: vec![json!("x")],
        };
        assert_eq!(inner.clone().negate().negate(), inner);
    }

    #[test]
    fn implies_is_negation_or() {
        let a = Filter::Constant(false);
        let b = Filter::Equals {
            path: column_path("slug"),
            values: vec![json!("x")],
        };
        // false → b is always true
        assert_eq!(a.implies(b), Filter::Constant(true));
    }

    #[test]
    fn make_unsatisfiable_collapses() {
        let mut filter = Filter::Constant(true);
        filter.make_unsatisfiable();
        assert!(filter.is_unsatisfiable());
    }

    #[test]
    fn equals_on_text_column() {
        let filter = Filter::Equals {
            path: column_path("slug"),
            values: vec![json!("foo")],
        };
        assert_eq!(filter.to_sql("cards"), "cards.slug = 'foo'");
    }

    #[test]
    fn equals_set_renders_in_list() {
        let filter = Filter::Equals {
            path: column_path("slug"),
            values: vec![json!("a"), json!("b")],
        };
        assert_eq!(filter.to_sql("cards"), "cards.slug IN ('a', 'b')");
    }

    #[test]
    fn equals_on_jsonb_keeps_value_type() {
        let number = Filter::Equals {
            path: data_path(&["checked"]),
            values: vec![json!(1)],
        };
        assert_eq!(
            number.to_sql("cards"),
            "cards.data#>'{\"checked\"}' = '1'::jsonb"
        );

        let string = Filter::Equals {
            path: data_path(&["checked"]),
            values: vec![json!("1")],
        };
        assert_eq!(
            string.to_sql("cards"),
            "cards.data#>'{\"checked\"}' = '\"1\"'::jsonb"
        );
    }

    #[test]
    fn equals_with_impossible_native_type_is_false() {
        let filter = Filter::Equals {
            path: column_path("active"),
            values: vec![json!("not-a-bool")],
        };
        assert_eq!(filter.to_sql("cards"), "false");
    }

    #[test]
    fn value_is_numeric_casts_json_text() {
        let filter = Filter::ValueIs {
            path: data_path(&["count"]),
            op: CompareOp::Ge,
            value: json!(5),
            cast: Some(ValueCast::Numeric),
        };
        assert_eq!(
            filter.to_sql("cards"),
            "(cards.data#>>'{\"count\"}')::numeric >= 5"
        );
    }

    #[test]
    fn value_is_timestamp_on_native_column() {
        let filter = Filter::ValueIs {
            path: column_path("created_at"),
            op: CompareOp::Le,
            value: json!("2019-08-08T00:00:00.000Z"),
            cast: Some(ValueCast::Timestamp),
        };
        assert_eq!(
            filter.to_sql("cards"),
            "cards.created_at <= '2019-08-08T00:00:00.000Z'::timestamptz"
        );
    }

    #[test]
    fn regex_operator_honors_case_flag() {
        let sensitive = Filter::MatchesRegex {
            path: column_path("slug"),
            pattern: "^foo".to_string(),
            ignore_case: false,
        };
        assert_eq!(sensitive.to_sql("cards"), "cards.slug ~ '^foo'");

        let insensitive = Filter::MatchesRegex {
            path: column_path("slug"),
            pattern: "^foo".to_string(),
            ignore_case: true,
        };
        assert_eq!(insensitive.to_sql("cards"), "cards.slug ~* '^foo'");
    }

    #[test]
    fn json_type_guard_renders_typeof() {
        let filter = Filter::IsOfJsonTypes {
            path: data_path(&["x"]),
            types: vec![JsonType::String],
        };
        assert_eq!(
            filter.to_sql("cards"),
            "coalesce(jsonb_typeof(cards.data#>'{\"x\"}') = 'string', false)"
        );
    }

    #[test]
    fn array_length_on_native_array_uses_coalesce() {
        let filter = Filter::ArrayLength {
            path: column_path("tags"),
            op: CompareOp::Ge,
            length: 1,
        };
        assert_eq!(
            filter.to_sql("cards"),
            "coalesce(array_length(cards.tags, 1), 0) >= 1"
        );
    }

    #[test]
    fn array_contains_unnests_text_arrays() {
        let element = Filter::Equals {
            path: Path::element("contains0", false),
            values: vec![json!("urgent")],
        };
        let filter = Filter::ArrayContains {
            path: column_path("tags"),
            alias: "contains0".to_string(),
            element: Box::new(element),
        };
        assert_eq!(
            filter.to_sql("cards"),
            "EXISTS (SELECT 1 FROM unnest(cards.tags) AS contains0 WHERE contains0 = 'urgent')"
        );
    }

    #[test]
    fn array_contains_on_jsonb_uses_array_elements() {
        let element = Filter::MatchesRegex {
            path: Path::element("contains0", true),
            pattern: "^https".to_string(),
            ignore_case: false,
        };
        let filter = Filter::ArrayContains {
            path: data_path(&["mirrors"]),
            alias: "contains0".to_string(),
            element: Box::new(element),
        };
        let sql = filter.to_sql("cards");
        assert!(sql.contains("jsonb_array_elements(cards.data#>'{\"mirrors\"}')"));
        assert!(sql.contains("contains0.value#>>'{}' ~ '^https'"));
    }

    #[test]
    fn without_links_erases_link_constraints() {
        let link = Filter::Link {
            name: "is attached to".to_string(),
            join_alias: "linked0".to_string(),
            sub: Box::new(Filter::Constant(true)),
        };
        let guard = Filter::conjoin(vec![
            link,
            Filter::Equals {
                path: column_path("slug"),
                values: vec![json!("x")],
            },
        ]);
        let erased = guard.without_links();
        assert!(!erased.to_sql("cards").contains("linked0"));
        assert!(erased.to_sql("cards").contains("cards.slug"));
    }

    #[test]
    fn link_renders_join_alias_existence_and_sub() {
        let sub = Filter::Equals {
            path: column_path("type"),
            values: vec![json!("card@1.0.0")],
        };
        let filter = Filter::Link {
            name: "is attached to".to_string(),
            join_alias: "linked0".to_string(),
            sub: Box::new(sub),
        };
        assert_eq!(
            filter.to_sql("cards"),
            "(linked0.id IS NOT NULL AND linked0.type = 'card@1.0.0')"
        );
    }
}
